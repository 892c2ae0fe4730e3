use std::fmt;

use futures::future::BoxFuture;

use crate::{ResourceError, ResourceKey};

/// Control-transfer signal raised by [`read`](crate::ResourceCache::read)
/// instead of a value.
///
/// A `Pending` interrupt is not an error: it means "re-invoke this subtree
/// once the operation settles" and is handled by the nearest suspension
/// boundary. A `Failed` interrupt carries the error the operation settled
/// with and is handled by the nearest recovery boundary. The two are never
/// interchangeable.
pub enum Interrupt {
    /// The backing operation has not settled yet.
    Pending(Settlement),
    /// The backing operation settled with an error.
    Failed(ResourceError),
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Pending(settlement) => {
                f.debug_tuple("Pending").field(&settlement.key()).finish()
            }
            Interrupt::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

/// The outcome of evaluating a piece of UI: a view, or an [`Interrupt`]
/// raised by a read somewhere in the subtree.
pub type RenderResult<V> = Result<V, Interrupt>;

/// A handle resolving once a pending operation settles, successfully or
/// with failure.
///
/// Waiting never re-runs the producer; it merely observes the entry's
/// status transition. If the entry is invalidated while waiting, the handle
/// resolves as well so the subtree can re-render against a fresh entry.
pub struct Settlement {
    key: ResourceKey,
    wait: BoxFuture<'static, ()>,
}

impl Settlement {
    pub(crate) fn new(key: ResourceKey, wait: BoxFuture<'static, ()>) -> Self {
        Self { key, wait }
    }

    /// The key of the pending entry this handle observes.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Resolves once the entry leaves its pending state.
    pub async fn wait(self) {
        self.wait.await
    }
}

impl fmt::Debug for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement").field("key", &self.key).finish()
    }
}
