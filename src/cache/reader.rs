//! Read-through cache for single entities and collection listings.
//!
//! The cache is an optimisation only: a timeout, backend failure or
//! undecodable entry is treated as a miss and the loader is consulted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{bounded, CollectionKey, EntityKind, KvStore};
use crate::storage::StoreError;

#[derive(Clone)]
pub struct CacheAsideReader {
    backend: Arc<dyn KvStore>,
    timeout: Duration,
    ttl: Duration,
}

impl CacheAsideReader {
    pub fn new(backend: Arc<dyn KvStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            ttl,
        }
    }

    /// Read one entity. `Ok(None)` from the loader is returned as-is and
    /// never cached, so a later creation is visible on the next read.
    pub async fn read_one<T, F, Fut>(
        &self,
        kind: EntityKind,
        id: &str,
        loader: F,
    ) -> Result<Option<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Option<T>, StoreError>>,
    {
        let key = kind.key(id);
        if let Some(value) = self.lookup(&key).await {
            return Ok(Some(value));
        }

        let loaded = loader(id.to_string()).await?;
        match &loaded {
            Some(value) => self.populate(&key, value).await,
            None => debug!(key = %key, "not found in store, not cached"),
        }
        Ok(loaded)
    }

    /// Read a listing under its fixed collection key
    pub async fn read_many<T, F, Fut>(
        &self,
        collection: CollectionKey,
        loader: F,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, StoreError>>,
    {
        let key = collection.as_str();
        if let Some(values) = self.lookup(key).await {
            return Ok(values);
        }

        let loaded = loader().await?;
        self.populate(key, &loaded).await;
        Ok(loaded)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match bounded(self.timeout, self.backend.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache unavailable, reading from store");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Best effort: a failed write leaves the read result untouched
    async fn populate<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        match bounded(self.timeout, self.backend.set(key, data, self.ttl)).await {
            Ok(()) => debug!(key = %key, ttl_secs = self.ttl.as_secs(), "cache populated"),
            Err(e) => warn!(key = %key, error = %e, "Failed to populate cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testutil::{CountingKv, FailingKv, SlowKv};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);
    const TIMEOUT: Duration = Duration::from_millis(50);

    fn reader(backend: Arc<dyn KvStore>) -> CacheAsideReader {
        CacheAsideReader::new(backend, TTL, TIMEOUT)
    }

    async fn load_name(
        calls: &AtomicUsize,
        value: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value.map(str::to_string))
    }

    #[tokio::test]
    async fn test_miss_loads_once_then_hits() {
        let backend = Arc::new(CountingKv::new(MemoryCache::new()));
        let reader = reader(backend.clone());
        let calls = AtomicUsize::new(0);

        let first = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("Rust")))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("Rust"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.sets(), 1);

        let second = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("Rust")))
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("Rust"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.sets(), 1);
    }

    #[tokio::test]
    async fn test_loader_receives_id() {
        let reader = reader(Arc::new(MemoryCache::new()));
        let value = reader
            .read_one(EntityKind::User, "u42", |id| async move {
                Ok::<_, StoreError>(Some(id))
            })
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("u42"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let backend = Arc::new(CountingKv::new(MemoryCache::new()));
        let reader = reader(backend.clone());
        let calls = AtomicUsize::new(0);

        let missing = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, None))
            .await
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(backend.sets(), 0);

        // Created afterwards: visible without any invalidation
        let created = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("New")))
            .await
            .unwrap();
        assert_eq!(created.as_deref(), Some("New"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failing_backend_falls_back_to_loader() {
        let reader = reader(Arc::new(FailingKv));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = reader
                .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("Rust")))
                .await
                .unwrap();
            assert_eq!(value.as_deref(), Some("Rust"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_to_loader() {
        let reader = reader(Arc::new(SlowKv::new(Duration::from_secs(5))));
        let calls = AtomicUsize::new(0);

        let value = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("Rust")))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("Rust"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let reader = reader(Arc::new(MemoryCache::new()));
        let result = reader
            .read_one::<String, _, _>(EntityKind::Course, "c1", |_| async {
                Err(StoreError::Task("disk on fire".to_string()))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set(&EntityKind::Course.key("c1"), b"not json".to_vec(), TTL)
            .await
            .unwrap();
        let reader = reader(backend);
        let calls = AtomicUsize::new(0);

        let value = reader
            .read_one(EntityKind::Course, "c1", |_| load_name(&calls, Some("Rust")))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("Rust"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_many_caches_listing() {
        let backend = Arc::new(CountingKv::new(MemoryCache::new()));
        let reader = reader(backend.clone());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let names: Vec<String> = reader
                .read_many(CollectionKey::CourseCatalog, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["a".to_string(), "b".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(names.len(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.sets(), 1);
    }
}
