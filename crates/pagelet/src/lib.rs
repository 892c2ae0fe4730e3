//! Suspension and recovery boundaries for asynchronously loaded UI
//! sections.
//!
//! This crate builds on [`pagelet_cache`]: reads raise tagged interrupts,
//! and the boundary types here inspect and act on those tags explicitly.
//!
//! - A [`SuspenseBoundary`] intercepts pending reads: it renders a
//!   placeholder and carries the settlement handle upward, so the subtree
//!   is re-invoked once the operation settles. It never catches failures.
//! - A [`RecoveryBoundary`] intercepts failed reads: it renders a fallback
//!   parameterized by the captured error and a [`ResetHandle`], and keeps
//!   doing so until an explicit reset invalidates its owned keys and
//!   re-attempts the subtree. It never intercepts pending reads; by
//!   construction it wraps a suspension boundary, which is always the inner
//!   of the two.
//! - A [`SectionCoordinator`] composes any number of such boundary pairs
//!   into independently loading, independently failing page sections.
//! - The [`Renderer`] is the cooperative driver standing in for a host
//!   rendering model: it re-invokes a suspended root whenever one of its
//!   operations settles, publishing every intermediate frame.

mod boundary;
mod component;
mod coordinator;
mod renderer;

pub use boundary::{Frame, RecoveryBoundary, ResetHandle, ResetScope, SuspenseBoundary};
pub use component::Component;
pub use coordinator::{Section, SectionCoordinator};
pub use renderer::{Render, RenderError, Renderer, RendererConfig};
