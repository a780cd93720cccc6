//! Cache-aside data layer: backends, key layout, the read-through reader and
//! the write-path invalidator.

pub mod backend;
pub mod invalidator;
pub mod keys;
pub mod reader;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use backend::{CacheBackend, KvStore, MemoryCache, RedisCache};
pub use invalidator::Invalidator;
pub use keys::{CollectionKey, EntityKind};
pub use reader::CacheAsideReader;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] deadpool_redis::redis::RedisError),
    #[error("Cache connection error: {0}")]
    Connection(String),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Bound a backend call by `timeout`
pub async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(timeout, op)
        .await
        .map_err(|_| CacheError::Timeout(timeout))?
}
