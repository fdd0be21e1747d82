//! Account Repository
//!
//! Creation and cache-aside reads over the account table. Reads that miss
//! the cache go through the request collapser, so a burst of readers for the
//! same cold account costs one store query.
//!
//! Every cache fill is published through the [`WriteFence`]: a fill whose
//! store read raced a committed transfer is dropped and read again, so it
//! never overwrites the snapshot the transfer engine published.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CacheStore, WriteFence};
use crate::collapse::RequestCollapser;
use crate::error::LedgerError;
use crate::models::AccountSnapshot;
use crate::service::LedgerSettings;
use crate::store::{self, LedgerStore, StoreError};

/// Store reads per cache fill before a raced snapshot is returned uncached
const FILL_ATTEMPTS: u32 = 3;

pub struct AccountRepository {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    fence: Arc<WriteFence>,
    loads: RequestCollapser<Result<AccountSnapshot, LedgerError>>,
    ttl: Duration,
    deadline: Duration,
}

impl AccountRepository {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        fence: Arc<WriteFence>,
        settings: &LedgerSettings,
    ) -> Self {
        Self {
            store,
            cache,
            fence,
            loads: RequestCollapser::new(),
            ttl: settings.account_ttl,
            deadline: settings.request_timeout,
        }
    }

    /// Insert a new account and prime its cache entry.
    ///
    /// `initial_balance` must already be validated decimal text.
    pub async fn create_account(
        &self,
        account_id: i64,
        initial_balance: &str,
    ) -> Result<AccountSnapshot, LedgerError> {
        let key = cache::account_key(account_id);
        let seen = self.fence.version(&key);
        let row = store::within(
            self.deadline,
            "insert_account",
            self.store.insert_account(account_id, initial_balance),
        )
        .await
        .map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                LedgerError::Conflict(format!("account {} already exists", account_id))
            }
            other => {
                tracing::error!(account_id, error = %other, "failed to insert account");
                other.into()
            }
        })?;

        let snapshot = AccountSnapshot::from(row);
        cache::publish_json(
            self.cache.as_ref(),
            &self.fence,
            &key,
            &snapshot,
            self.ttl,
            seen,
        )
        .await;

        tracing::info!(account_id, balance = %snapshot.balance, "account created");
        Ok(snapshot)
    }

    /// Cached snapshot if present, else one collapsed store read.
    pub async fn get_account_by_id(&self, account_id: i64) -> Result<AccountSnapshot, LedgerError> {
        let key = cache::account_key(account_id);
        if let Some(snapshot) = cache::load_json::<AccountSnapshot>(self.cache.as_ref(), &key).await
        {
            tracing::debug!(account_id, "account cache hit");
            return Ok(snapshot);
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let fence = Arc::clone(&self.fence);
        let ttl = self.ttl;
        let deadline = self.deadline;
        let cache_key = key.clone();

        self.loads
            .run(&key, move || async move {
                tracing::debug!(account_id, "account cache miss, loading");
                let mut attempt = 1;
                loop {
                    let seen = fence.version(&cache_key);
                    let row =
                        store::within(deadline, "find_account", store.find_account(account_id))
                            .await
                            .map_err(|e| {
                                tracing::error!(account_id, error = %e, "failed to load account");
                                LedgerError::from(e)
                            })?;
                    let snapshot = AccountSnapshot::from(
                        row.ok_or_else(|| LedgerError::account_not_found(account_id))?,
                    );

                    let published = cache::publish_json(
                        cache.as_ref(),
                        &fence,
                        &cache_key,
                        &snapshot,
                        ttl,
                        seen,
                    )
                    .await;
                    if published || attempt == FILL_ATTEMPTS {
                        return Ok(snapshot);
                    }
                    tracing::debug!(account_id, attempt, "account changed during load, reloading");
                    attempt += 1;
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::cache::testing::BrokenCache;
    use crate::store::testing::FaultyStore;
    use std::sync::atomic::Ordering;

    fn repository(store: Arc<FaultyStore>, cache: Arc<dyn CacheStore>) -> AccountRepository {
        let fence = Arc::new(WriteFence::new());
        AccountRepository::new(store, cache, fence, &LedgerSettings::default())
    }

    #[tokio::test]
    async fn test_create_primes_cache() {
        let store = Arc::new(FaultyStore::default());
        let cache = Arc::new(TtlCache::default());
        let repo = repository(store.clone(), cache.clone());

        let created = repo.create_account(1001, "500.00").await.unwrap();
        assert_eq!(created.balance, "500");

        let fetched = repo.get_account_by_id(1001).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.inner.account_reads(), 0, "served from cache");
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let store = Arc::new(FaultyStore::default());
        let repo = repository(store, Arc::new(TtlCache::default()));

        repo.create_account(1001, "1").await.unwrap();
        let err = repo.create_account(1001, "2").await.unwrap_err();
        assert_eq!(err, LedgerError::Conflict("account 1001 already exists".into()));
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(FaultyStore::default());
        store.insert_account(1001, "500").await.unwrap();
        let repo = repository(store.clone(), Arc::new(TtlCache::default()));

        repo.get_account_by_id(1001).await.unwrap();
        repo.get_account_by_id(1001).await.unwrap();
        assert_eq!(store.inner.account_reads(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_collapse_to_one_read() {
        let store = Arc::new(FaultyStore::default());
        store.insert_account(1001, "500").await.unwrap();
        store.faults.find_delay_ms.store(50, Ordering::SeqCst);
        let repo = Arc::new(repository(store.clone(), Arc::new(TtlCache::default())));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move { repo.get_account_by_id(1001).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().balance, "500");
        }
        assert_eq!(store.inner.account_reads(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_is_not_cached() {
        let store = Arc::new(FaultyStore::default());
        let repo = repository(store.clone(), Arc::new(TtlCache::default()));

        assert_eq!(
            repo.get_account_by_id(9999).await,
            Err(LedgerError::account_not_found(9999))
        );
        store.insert_account(9999, "1").await.unwrap();
        assert_eq!(repo.get_account_by_id(9999).await.unwrap().balance, "1");
    }

    #[tokio::test]
    async fn test_undecodable_entry_falls_back_to_store() {
        let store = Arc::new(FaultyStore::default());
        store.insert_account(1001, "500").await.unwrap();
        let cache = Arc::new(TtlCache::default());
        cache
            .set("account:1001", "garbage".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let repo = repository(store.clone(), cache);

        assert_eq!(repo.get_account_by_id(1001).await.unwrap().balance, "500");
        assert_eq!(store.inner.account_reads(), 1);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_through() {
        let store = Arc::new(FaultyStore::default());
        let repo = repository(store.clone(), Arc::new(BrokenCache::default()));

        repo.create_account(1001, "500").await.unwrap();
        assert_eq!(repo.get_account_by_id(1001).await.unwrap().balance, "500");
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let store = Arc::new(FaultyStore::default());
        store.faults.fail_find.store(true, Ordering::SeqCst);
        let repo = repository(store, Arc::new(TtlCache::default()));

        let err = repo.get_account_by_id(1001).await.unwrap_err();
        assert!(matches!(err, LedgerError::Internal(_)));
    }
}
