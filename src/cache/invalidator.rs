use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{bounded, CollectionKey, EntityKind, KvStore};

/// Write-path eviction. Call only after the authoritative write has been
/// accepted; backend failures are logged and absorbed.
#[derive(Clone)]
pub struct Invalidator {
    backend: Arc<dyn KvStore>,
    timeout: Duration,
}

impl Invalidator {
    pub fn new(backend: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Evict a single entity entry
    pub async fn invalidate(&self, kind: EntityKind, id: &str) {
        self.evict(&kind.key(id)).await;
    }

    /// Evict a named listing
    pub async fn invalidate_collection(&self, collection: CollectionKey) {
        self.evict(collection.as_str()).await;
    }

    /// An entity was updated or deleted: evict it and every listing of its kind
    pub async fn entity_written(&self, kind: EntityKind, id: &str) {
        self.invalidate(kind, id).await;
        self.collection_changed(kind).await;
    }

    /// An entity was created: only the listings can be stale
    pub async fn collection_changed(&self, kind: EntityKind) {
        for collection in kind.collections() {
            self.invalidate_collection(*collection).await;
        }
    }

    async fn evict(&self, key: &str) {
        match bounded(self.timeout, self.backend.delete(key)).await {
            Ok(removed) => debug!(key = %key, removed, "cache invalidated"),
            Err(e) => warn!(key = %key, error = %e, "Cache invalidation failed, entry expires by TTL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAsideReader, MemoryCache};
    use crate::storage::StoreError;
    use crate::testutil::FailingKv;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);
    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_mutation_forces_reload_with_new_value() {
        let backend: Arc<dyn KvStore> = Arc::new(MemoryCache::new());
        let reader = CacheAsideReader::new(Arc::clone(&backend), TTL, TIMEOUT);
        let invalidator = Invalidator::new(backend, TIMEOUT);
        let calls = AtomicUsize::new(0);

        let load = |value: &'static str| {
            let calls = &calls;
            move |_: String| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(Some(value.to_string()))
            }
        };

        let before = reader
            .read_one(EntityKind::Course, "c1", load("v1"))
            .await
            .unwrap();
        assert_eq!(before.as_deref(), Some("v1"));

        // Authoritative write accepted, then invalidate
        invalidator.entity_written(EntityKind::Course, "c1").await;

        let after = reader
            .read_one(EntityKind::Course, "c1", load("v2"))
            .await
            .unwrap();
        assert_eq!(after.as_deref(), Some("v2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entity_write_evicts_listings() {
        let backend = Arc::new(MemoryCache::new());
        for collection in EntityKind::Course.collections() {
            backend
                .set(collection.as_str(), b"[]".to_vec(), TTL)
                .await
                .unwrap();
        }
        backend
            .set(&EntityKind::Course.key("c1"), b"{}".to_vec(), TTL)
            .await
            .unwrap();
        backend
            .set(CollectionKey::AdminUsers.as_str(), b"[]".to_vec(), TTL)
            .await
            .unwrap();

        let invalidator = Invalidator::new(backend.clone(), TIMEOUT);
        invalidator.entity_written(EntityKind::Course, "c1").await;

        assert!(backend
            .get(&EntityKind::Course.key("c1"))
            .await
            .unwrap()
            .is_none());
        for collection in EntityKind::Course.collections() {
            assert!(backend.get(collection.as_str()).await.unwrap().is_none());
        }
        // Unrelated listing survives
        assert!(backend
            .get(CollectionKey::AdminUsers.as_str())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_collection_changed_keeps_entity_entries() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set(&EntityKind::User.key("u1"), b"{}".to_vec(), TTL)
            .await
            .unwrap();
        backend
            .set(CollectionKey::AdminUsers.as_str(), b"[]".to_vec(), TTL)
            .await
            .unwrap();

        let invalidator = Invalidator::new(backend.clone(), TIMEOUT);
        invalidator.collection_changed(EntityKind::User).await;

        assert!(backend
            .get(&EntityKind::User.key("u1"))
            .await
            .unwrap()
            .is_some());
        assert!(backend
            .get(CollectionKey::AdminUsers.as_str())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failing_backend_is_absorbed() {
        let invalidator = Invalidator::new(Arc::new(FailingKv), TIMEOUT);
        invalidator.entity_written(EntityKind::User, "u1").await;
    }
}
