//! Write Fence
//!
//! Per-key write versions that keep a slow cache fill from publishing a
//! snapshot older than the one the last writer published.
//!
//! - Writers `bump` the key after their commit, then publish.
//! - Fillers note `version` before reading the store, publish, and re-check.
//!   A changed version means the read may predate a commit, so the entry is
//!   dropped and the fill is retried.
//!
//! Only keys that have been written since startup hold an entry.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

use super::{CacheStore, store_json};

#[derive(Debug, Default)]
pub struct WriteFence {
    versions: DashMap<String, u64>,
}

impl WriteFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write version of `key`; 0 if never written
    pub fn version(&self, key: &str) -> u64 {
        self.versions.get(key).map(|v| *v).unwrap_or(0)
    }

    /// Record a committed write to `key` and return its new version.
    pub fn bump(&self, key: &str) -> u64 {
        let mut version = self.versions.entry(key.to_string()).or_insert(0);
        *version += 1;
        *version
    }
}

/// [`store_json`] guarded by the version `seen` before the value was produced.
///
/// Returns false when a newer write raced the publish; the entry has then
/// been invalidated and the caller's value must be treated as possibly stale.
pub async fn publish_json<T: Serialize>(
    cache: &dyn CacheStore,
    fence: &WriteFence,
    key: &str,
    value: &T,
    ttl: Duration,
    seen: u64,
) -> bool {
    store_json(cache, key, value, ttl).await;
    if fence.version(key) == seen {
        return true;
    }

    tracing::debug!(key, seen, "cache fill superseded by a newer write, invalidating");
    if let Err(e) = cache.delete(key).await {
        tracing::warn!(key, error = %e, "cache invalidation failed");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DEFAULT_TTL, TtlCache, load_json};

    #[test]
    fn test_versions() {
        let fence = WriteFence::new();
        assert_eq!(fence.version("account:1"), 0);
        assert_eq!(fence.bump("account:1"), 1);
        assert_eq!(fence.bump("account:1"), 2);
        assert_eq!(fence.version("account:1"), 2);
        assert_eq!(fence.version("account:2"), 0);
    }

    #[tokio::test]
    async fn test_publish_keeps_current_value() {
        let cache = TtlCache::default();
        let fence = WriteFence::new();
        let seen = fence.bump("account:1");

        assert!(publish_json(&cache, &fence, "account:1", &"350", DEFAULT_TTL, seen).await);
        let loaded: Option<String> = load_json(&cache, "account:1").await;
        assert_eq!(loaded.as_deref(), Some("350"));
    }

    #[tokio::test]
    async fn test_superseded_publish_is_dropped() {
        let cache = TtlCache::default();
        let fence = WriteFence::new();
        let seen = fence.version("account:1");
        fence.bump("account:1");

        assert!(!publish_json(&cache, &fence, "account:1", &"500", DEFAULT_TTL, seen).await);
        let loaded: Option<String> = load_json(&cache, "account:1").await;
        assert_eq!(loaded, None);
    }
}
