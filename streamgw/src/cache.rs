//! The FileLocator Cache: a mutex-protected `message_id -> FileLocator` map
//! with coarse, wholesale periodic invalidation instead of per-entry TTLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use msgstore_client::FileLocator;
use tokio::sync::Mutex;

/// Shared across every in-flight stream on this engine.
pub struct FileLocatorCache {
    entries: Mutex<HashMap<i64, FileLocator>>,
}

impl FileLocatorCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, message_id: i64) -> Option<FileLocator> {
        self.entries.lock().await.get(&message_id).cloned()
    }

    pub async fn insert(&self, message_id: i64, locator: FileLocator) {
        self.entries.lock().await.insert(message_id, locator);
    }

    /// Evicts a single stale entry, e.g. after a `StaleReference` error.
    pub async fn evict(&self, message_id: i64) {
        self.entries.lock().await.remove(&message_id);
    }

    /// Wholesale eviction of every cached entry.
    pub async fn sweep(&self) {
        let mut entries = self.entries.lock().await;
        let evicted = entries.len();
        entries.clear();
        tracing::debug!(evicted, "swept locator cache");
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for FileLocatorCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the coarse periodic sweep, matching `clean_cache()` in the
/// original streamer: a detached loop that sleeps `interval`, then clears
/// the cache wholesale, forever.
pub fn spawn_sweeper(cache: Arc<FileLocatorCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            cache.sweep().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn dummy_locator() -> FileLocator {
        FileLocator::document(1, 1, 1, Bytes::from_static(b"ref"), String::new())
    }

    #[tokio::test]
    async fn miss_then_insert_then_hit() {
        let cache = FileLocatorCache::new();
        assert!(cache.get(42).await.is_none());
        cache.insert(42, dummy_locator()).await;
        assert!(cache.get(42).await.is_some());
    }

    #[tokio::test]
    async fn sweep_is_idempotent_and_leaves_cache_empty() {
        let cache = FileLocatorCache::new();
        cache.insert(1, dummy_locator()).await;
        cache.insert(2, dummy_locator()).await;

        for _ in 0..5 {
            cache.sweep().await;
            assert_eq!(cache.len().await, 0);
        }
    }
}
