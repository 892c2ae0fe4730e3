//! Keyed caching of asynchronous results with cooperative suspension.
//!
//! The central type is the [`ResourceCache`]: a keyed store of in-flight
//! and settled asynchronous operations that deduplicates concurrent
//! requests, so that any number of readers of the same key share exactly
//! one operation.
//!
//! On top of it sits the read primitive,
//! [`ResourceCache::read`]: called from within a rendering pass, it either
//! returns the resolved value synchronously, or raises an [`Interrupt`] as
//! a tagged result. A pending interrupt carries a [`Settlement`] handle
//! that resolves once the operation settles, letting the enclosing pass
//! abandon the subtree and re-attempt it later instead of blocking a
//! thread. A failed interrupt carries the [`ResourceError`] the operation
//! was rejected with.
//!
//! ## Entry lifecycle
//!
//! An entry is created on first read of an unseen key and starts out
//! pending. A continuation attached at creation time, and only that
//! continuation, settles it to fulfilled or rejected. Settled entries are
//! served from memory indefinitely; they are removed only by
//! [`invalidate`](ResourceCache::invalidate) or
//! [`clear`](ResourceCache::clear), never because a reading subtree went
//! away.
//!
//! Invalidation does not cancel the in-flight operation. Every entry
//! carries an identity that the settlement compares against the current
//! occupant of its key, so a settlement arriving late, after invalidation
//! or after the key was recreated, is detected and discarded.
//!
//! The boundary types that act on interrupts live in the `pagelet` crate.

mod cache;
mod error;
mod interrupt;
mod key;
pub mod producer;

pub use cache::{CacheConfig, EntryState, Invalidate, ResourceCache};
pub use error::{LoadResult, ResourceError};
pub use interrupt::{Interrupt, RenderResult, Settlement};
pub use key::{ResourceKey, ResourceKeyBuilder};
