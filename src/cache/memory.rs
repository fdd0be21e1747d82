//! In-process TTL cache
//!
//! Backed by `cached::stores::ExpiringValueCache`: each entry carries its own
//! deadline and is dropped lazily when a read finds it expired. The store is
//! size-bounded; once full the least recently used entry is evicted.

use async_trait::async_trait;
use cached::Cached;
use cached::stores::{CanExpire, ExpiringValueCache};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{CacheError, CacheStore};

/// Default capacity
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl CanExpire for Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

pub struct TtlCache {
    store: Mutex<ExpiringValueCache<String, Entry>>,
}

impl TtlCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(ExpiringValueCache::with_size(max_entries.max(1))),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, ExpiringValueCache<String, Entry>>, CacheError> {
        self.store
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".into()))
    }

    /// Entries currently held, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.store().map(|s| s.cache_size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for TtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut store = self.store()?;
        Ok(store.cache_get(&key.to_string()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.store()?.cache_set(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store()?.cache_remove(&key.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.store().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = TtlCache::default();
        assert_eq!(cache.get("account:1").await.unwrap(), None);

        cache
            .set("account:1", "v1".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("account:1").await.unwrap(), Some("v1".into()));

        cache
            .set("account:1", "v2".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("account:1").await.unwrap(), Some("v2".into()));

        cache.delete("account:1").await.unwrap();
        assert_eq!(cache.get("account:1").await.unwrap(), None);

        // deleting a missing key is fine
        cache.delete("account:1").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = TtlCache::default();
        cache
            .set("transfer:1", "short".into(), Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set("transfer:2", "long".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("transfer:1").await.unwrap(), None);
        assert_eq!(cache.get("transfer:2").await.unwrap(), Some("long".into()));
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let cache = TtlCache::new(2);
        for i in 0..5 {
            cache
                .set(&format!("account:{}", i), i.to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("account:4").await.unwrap(), Some("4".into()));
    }

    #[tokio::test]
    async fn test_ping() {
        assert!(TtlCache::default().ping().await.is_ok());
    }
}
