//! Read-through lookup of committed transfers

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CacheStore};
use crate::collapse::RequestCollapser;
use crate::error::LedgerError;
use crate::models::TransferRecord;
use crate::service::LedgerSettings;
use crate::store::{self, LedgerStore};

pub struct TransferRepository {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    loads: RequestCollapser<Result<TransferRecord, LedgerError>>,
    ttl: Duration,
    deadline: Duration,
}

impl TransferRepository {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        settings: &LedgerSettings,
    ) -> Self {
        Self {
            store,
            cache,
            loads: RequestCollapser::new(),
            ttl: settings.transfer_ttl,
            deadline: settings.request_timeout,
        }
    }

    pub async fn get_transfer_by_id(
        &self,
        transaction_id: i64,
    ) -> Result<TransferRecord, LedgerError> {
        let key = cache::transfer_key(transaction_id);
        if let Some(record) = cache::load_json::<TransferRecord>(self.cache.as_ref(), &key).await {
            return Ok(record);
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let ttl = self.ttl;
        let deadline = self.deadline;
        let cache_key = key.clone();

        self.loads
            .run(&key, move || async move {
                let row = store::within(deadline, "find_transfer", store.find_transfer(transaction_id))
                    .await
                    .map_err(|e| {
                        tracing::error!(transaction_id, error = %e, "failed to load transfer");
                        LedgerError::from(e)
                    })?;
                let record = TransferRecord::from(
                    row.ok_or_else(|| LedgerError::transfer_not_found(transaction_id))?,
                );

                // Ledger entries never change, so this cannot go stale
                cache::store_json(cache.as_ref(), &cache_key, &record, ttl).await;
                Ok(record)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::store::{MemoryLedgerStore, NewTransfer, StoreTx};

    async fn seeded_store() -> (Arc<MemoryLedgerStore>, i64) {
        let store = Arc::new(MemoryLedgerStore::new());
        store.insert_account(1, "10").await.unwrap();
        store.insert_account(2, "0").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let row = tx
            .insert_transfer(&NewTransfer {
                source_account_id: 1,
                destination_account_id: 2,
                amount: "2.50".into(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (store, row.id)
    }

    #[tokio::test]
    async fn test_get_transfer_populates_cache() {
        let (store, id) = seeded_store().await;
        let cache = Arc::new(TtlCache::default());
        let repo = TransferRepository::new(store, cache.clone(), &LedgerSettings::default());

        let record = repo.get_transfer_by_id(id).await.unwrap();
        assert_eq!(record.transaction_id, id);
        assert_eq!(record.amount, "2.5");

        let cached: Option<TransferRecord> =
            cache::load_json(cache.as_ref(), &cache::transfer_key(id)).await;
        assert_eq!(cached, Some(record));
    }

    #[tokio::test]
    async fn test_missing_transfer() {
        let (store, _) = seeded_store().await;
        let repo =
            TransferRepository::new(store, Arc::new(TtlCache::default()), &LedgerSettings::default());

        assert_eq!(
            repo.get_transfer_by_id(404).await,
            Err(LedgerError::transfer_not_found(404))
        );
    }
}
