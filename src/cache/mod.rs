//! Cache-Aside Store
//!
//! Read accelerator for account and transfer snapshots. Never authoritative:
//! an entry may be stale or missing at any time, and a miss never means the
//! entity does not exist.
//!
//! Every failure here is absorbed by the caller. [`store_json`] and
//! [`load_json`] do that absorption in one place so repositories and the
//! transfer engine only ever see `Option`.

pub mod fence;
pub mod memory;

pub use fence::{WriteFence, publish_json};
pub use memory::TtlCache;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a cached snapshot
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache encode error: {0}")]
    Encode(String),
}

/// Key/value store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

pub fn account_key(account_id: i64) -> String {
    format!("account:{}", account_id)
}

pub fn transfer_key(transaction_id: i64) -> String {
    format!("transfer:{}", transaction_id)
}

/// Serialize `value` and write it under `key`.
///
/// On any failure the key is deleted (best effort) so a stale entry does not
/// outlive a write that already reached the store. Never fails.
pub async fn store_json<T: Serialize>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    let result = match serde_json::to_string(value) {
        Ok(json) => cache.set(key, json, ttl).await,
        Err(e) => Err(CacheError::Encode(e.to_string())),
    };

    if let Err(e) = result {
        tracing::warn!(key, error = %e, "cache set failed, invalidating");
        if let Err(e) = cache.delete(key).await {
            tracing::warn!(key, error = %e, "cache invalidation failed");
        }
    }
}

/// Read and decode `key`. Errors and undecodable entries count as a miss.
pub async fn load_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    let raw = match cache.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(key, error = %e, "cache get failed");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "undecodable cache entry, treating as miss");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Cache doubles shared by repository and engine tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every call fails. Counts deletes.
    #[derive(Default)]
    pub struct BrokenCache {
        pub deletes: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    /// Reads and deletes work, sets fail.
    #[derive(Default)]
    pub struct ReadOnlyCache {
        pub inner: TtlCache,
    }

    #[async_trait]
    impl CacheStore for ReadOnlyCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("read-only replica".into()))
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }
}
