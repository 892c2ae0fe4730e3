//! Helpers for building producer operations.

use std::future::Future;
use std::time::Duration;

use crate::{LoadResult, ResourceError};

/// An operation resolving to `value` after `delay`.
pub fn resolve_after<T: Send>(
    delay: Duration,
    value: T,
) -> impl Future<Output = LoadResult<T>> + Send {
    async move {
        tokio::time::sleep(delay).await;
        Ok(value)
    }
}

/// An operation rejecting with `error` after `delay`.
pub fn reject_after<T: Send>(
    delay: Duration,
    error: ResourceError,
) -> impl Future<Output = LoadResult<T>> + Send {
    async move {
        tokio::time::sleep(delay).await;
        Err(error)
    }
}

/// Rejects with [`ResourceError::Timeout`] if `operation` does not settle
/// within `limit`.
///
/// For a per-cache deadline, see
/// [`CacheConfig::operation_timeout`](crate::CacheConfig::operation_timeout);
/// this helper is for a single producer implementing its own.
pub async fn with_deadline<T>(
    limit: Duration,
    operation: impl Future<Output = LoadResult<T>>,
) -> LoadResult<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(settled) => settled,
        Err(_) => Err(ResourceError::Timeout(limit)),
    }
}
