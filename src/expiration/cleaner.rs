use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::MemoryCache;

/// Start the background sweep of expired in-memory entries. Reads already
/// skip expired entries; the sweep only reclaims their memory.
pub fn start_expiration_cleaner(cache: Arc<MemoryCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&cache);
        }
    })
}

fn run_cleanup(cache: &MemoryCache) {
    let purged = cache.purge_expired();
    if purged > 0 {
        debug!(entries_purged = purged, remaining = cache.len(), "Expired cache entries purged");
    }
}
