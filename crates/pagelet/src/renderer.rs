use futures::future::select_all;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::boundary::Frame;

/// Configuration for the render driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Upper bound on render passes for one
    /// [`run_to_completion`](Renderer::run_to_completion) call.
    ///
    /// Guards against a subtree that suspends on a fresh key every pass and
    /// would otherwise never settle.
    pub max_passes: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig { max_passes: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The root kept suspending past the configured pass budget.
    #[error("render pass budget of {0} exhausted")]
    PassBudget(usize),
}

/// An infallible root subtree.
///
/// Failures are already terminated by a recovery boundary and pending reads
/// already converted to placeholder frames, so rendering the root always
/// produces a frame.
pub trait Render<V> {
    fn render(&mut self) -> Frame<V>;
}

/// Cooperative driver standing in for a host rendering model.
///
/// Repeatedly renders the root, publishing every frame to subscribers.
/// Whenever the root suspends, the pass is abandoned and the driver waits
/// for any of the outstanding settlements before re-invoking the root; no
/// thread is ever blocked. Suspension points exist only at reads whose
/// entry is pending.
pub struct Renderer<V> {
    config: RendererConfig,
    frames: watch::Sender<Option<V>>,
}

impl<V: Clone + Send + Sync + 'static> Renderer<V> {
    pub fn new(config: RendererConfig) -> Self {
        let (frames, _) = watch::channel(None);
        Renderer { config, frames }
    }

    /// Observer for every frame published by
    /// [`run_to_completion`](Self::run_to_completion), placeholder frames
    /// included. Holds `None` until the first pass.
    pub fn subscribe(&self) -> watch::Receiver<Option<V>> {
        self.frames.subscribe()
    }

    /// Drives `root` until it renders fully, returning the final view.
    ///
    /// Settlement wake-ups arrive in the order the underlying operations
    /// complete, not the order their reads were issued; every wake-up
    /// triggers one fresh pass over the root.
    pub async fn run_to_completion<R>(&self, root: &mut R) -> Result<V, RenderError>
    where
        R: Render<V>,
    {
        for pass in 0..self.config.max_passes {
            match root.render() {
                Frame::Complete(view) => {
                    tracing::debug!(pass, "render complete");
                    self.frames.send_replace(Some(view.clone()));
                    return Ok(view);
                }
                Frame::Suspended { view, settlements } => {
                    tracing::debug!(pass, pending = settlements.len(), "render suspended");
                    self.frames.send_replace(Some(view));
                    if settlements.is_empty() {
                        // A suspended frame without settlements cannot make
                        // progress; fall through to the pass budget.
                        tracing::warn!(pass, "suspended frame carries no settlements");
                        continue;
                    }
                    let waits = settlements
                        .into_iter()
                        .map(|settlement| Box::pin(settlement.wait()))
                        .collect::<Vec<_>>();
                    select_all(waits).await;
                }
            }
        }
        Err(RenderError::PassBudget(self.config.max_passes))
    }
}

impl<V: Clone + Send + Sync + 'static> Default for Renderer<V> {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}
