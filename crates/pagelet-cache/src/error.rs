use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::ResourceKey;

/// An error produced while loading a resource.
///
/// This error enum is intended for storing in rejected cache entries: it is
/// clonable so that every reader of a rejected entry observes the same
/// captured error, without re-running the producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The resource was missing, or the backing service was unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The producer's operation gave up after a deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The producer's operation failed.
    ///
    /// The attached string carries the original error.
    #[error("{0}")]
    Producer(String),
    /// The producer function or its operation panicked.
    ///
    /// The cache records the panic as a rejected entry instead of unwinding
    /// into the rendering pass.
    #[error("producer panicked: {0}")]
    Panicked(String),
    /// A second concurrent operation was started for a key that already has
    /// an entry.
    ///
    /// Only reachable through [`ResourceCache::start`](crate::ResourceCache::start);
    /// [`get_or_create`](crate::ResourceCache::get_or_create) always reuses
    /// the existing entry.
    #[error("operation already in flight for key `{0}`")]
    DuplicateOperation(ResourceKey),
}

impl ResourceError {
    /// Captures an arbitrary error as a [`Producer`](Self::Producer) error.
    pub fn producer(err: impl fmt::Display) -> Self {
        Self::Producer(err.to_string())
    }
}

/// The output of a producer's operation, either a value or the reason why
/// the resource could not be loaded.
pub type LoadResult<T = ()> = Result<T, ResourceError>;
