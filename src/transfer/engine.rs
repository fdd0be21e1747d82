//! Transfer Engine
//!
//! The only writer of account balances. One transfer is one store
//! transaction:
//!
//! 1. begin
//! 2. lock both rows, lower account id first
//! 3. check the source can cover the amount
//! 4. write both balances and append the ledger entry
//! 5. commit
//!
//! then, outside the transaction and outside the error path, bump both
//! account keys on the write fence and overwrite the cached snapshots of both
//! accounts and the new transfer.
//!
//! Steps 1-5 run under a deadline. On expiry the transaction future is
//! dropped, which rolls it back and releases the row locks. The cache step is
//! not covered, so a committed transfer is never reported as failed.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CacheStore, WriteFence};
use crate::error::LedgerError;
use crate::models::{AccountSnapshot, TransferRecord, TransferRequest};
use crate::money;
use crate::service::LedgerSettings;
use crate::store::{self, AccountRow, LedgerStore, NewTransfer, StoreTx};

use super::state::TransferPhase;

/// Result of the transactional part, handed to the cache sync
struct Committed {
    record: TransferRecord,
    source: AccountSnapshot,
    destination: AccountSnapshot,
    phase: TransferPhase,
}

/// Balances and ledger entry staged inside the open transaction
#[derive(Debug)]
struct Staged {
    record: TransferRecord,
    source: AccountSnapshot,
    destination: AccountSnapshot,
}

pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    fence: Arc<WriteFence>,
    account_ttl: Duration,
    transfer_ttl: Duration,
    deadline: Duration,
}

impl TransferEngine {
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
            account_ttl: settings.account_ttl,
            transfer_ttl: settings.transfer_ttl,
            deadline: settings.request_timeout,
        }
    }

    /// Move `amount` from source to destination atomically.
    ///
    /// Self-transfers and non-positive amounts are rejected before a
    /// transaction is opened.
    #[tracing::instrument(
        name = "transfer_engine",
        skip(self, req),
        fields(
            source = req.source_account_id,
            destination = req.destination_account_id,
            amount = %req.amount,
        ),
        err
    )]
    pub async fn execute(&self, req: &TransferRequest) -> Result<TransferRecord, LedgerError> {
        if req.source_account_id == req.destination_account_id {
            return Err(LedgerError::validation(
                "source and destination accounts must differ",
            ));
        }
        let amount = money::normalize(&req.amount)?;
        if !money::greater_than(&amount, "0") {
            return Err(LedgerError::validation("amount must be greater than zero"));
        }

        let committed = store::within(
            self.deadline,
            "transfer",
            self.run_transaction(req, &amount),
        )
        .await?;

        let Committed {
            record,
            source,
            destination,
            mut phase,
        } = committed;

        self.sync_cache(&record, &source, &destination).await;
        phase.advance(TransferPhase::CacheSynced);

        tracing::info!(
            transaction_id = record.transaction_id,
            source_balance = %source.balance,
            destination_balance = %destination.balance,
            "transfer committed"
        );
        Ok(record)
    }

    async fn run_transaction(
        &self,
        req: &TransferRequest,
        amount: &str,
    ) -> Result<Committed, LedgerError> {
        let mut phase = TransferPhase::Pending;
        let mut tx = self.store.begin().await.map_err(|e| {
            tracing::error!(store = self.store.name(), error = %e, "failed to begin transaction");
            LedgerError::from(e)
        })?;

        let staged = match Self::apply(tx.as_mut(), req, amount, &mut phase).await {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::error!(error = %rb, "rollback failed, dropping transaction");
                }
                phase.advance(TransferPhase::RolledBack);
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!(store = self.store.name(), error = %e, "commit failed");
            phase.advance(TransferPhase::RolledBack);
            return Err(LedgerError::Internal(format!("commit failed: {}", e)));
        }
        phase.advance(TransferPhase::Committed);

        Ok(Committed {
            record: staged.record,
            source: staged.source,
            destination: staged.destination,
            phase,
        })
    }

    async fn apply(
        tx: &mut dyn StoreTx,
        req: &TransferRequest,
        amount: &str,
        phase: &mut TransferPhase,
    ) -> Result<Staged, LedgerError> {
        let source_id = req.source_account_id;
        let destination_id = req.destination_account_id;

        // Canonical lock order: every transaction touching the same pair
        // queues on the same row first.
        let (first_id, second_id) = if source_id < destination_id {
            (source_id, destination_id)
        } else {
            (destination_id, source_id)
        };
        let first = lock(tx, first_id).await?;
        let second = lock(tx, second_id).await?;
        phase.advance(TransferPhase::Locked);

        let (source, destination) = if first.account_id == source_id {
            (first, second)
        } else {
            (second, first)
        };

        if money::less_than(&source.balance, amount) {
            tracing::debug!(balance = %source.balance, "insufficient funds");
            return Err(LedgerError::InsufficientFunds);
        }
        phase.advance(TransferPhase::Validated);

        let new_source = money::try_sub(&source.balance, amount).map_err(|_| {
            LedgerError::validation("amount cannot be debited exactly from the source balance")
        })?;
        let new_destination = money::try_add(&destination.balance, amount).map_err(|_| {
            LedgerError::validation("amount cannot be credited exactly to the destination balance")
        })?;

        tx.update_balance(source.id, &new_source).await?;
        tx.update_balance(destination.id, &new_destination).await?;
        let row = tx
            .insert_transfer(&NewTransfer {
                source_account_id: source_id,
                destination_account_id: destination_id,
                amount: amount.to_string(),
            })
            .await?;

        Ok(Staged {
            record: row.into(),
            source: AccountSnapshot {
                account_id: source_id,
                balance: new_source,
            },
            destination: AccountSnapshot {
                account_id: destination_id,
                balance: new_destination,
            },
        })
    }

    async fn sync_cache(
        &self,
        record: &TransferRecord,
        source: &AccountSnapshot,
        destination: &AccountSnapshot,
    ) {
        let cache = self.cache.as_ref();
        let fence = self.fence.as_ref();
        let source_key = cache::account_key(source.account_id);
        let destination_key = cache::account_key(destination.account_id);
        let transfer_key = cache::transfer_key(record.transaction_id);

        // After commit: a fill that read the old rows must see the bump
        let source_version = fence.bump(&source_key);
        let destination_version = fence.bump(&destination_key);

        futures::join!(
            cache::publish_json(
                cache,
                fence,
                &source_key,
                source,
                self.account_ttl,
                source_version,
            ),
            cache::publish_json(
                cache,
                fence,
                &destination_key,
                destination,
                self.account_ttl,
                destination_version,
            ),
            cache::store_json(cache, &transfer_key, record, self.transfer_ttl),
        );
    }
}

async fn lock(tx: &mut dyn StoreTx, account_id: i64) -> Result<AccountRow, LedgerError> {
    match tx.lock_account(account_id).await {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(LedgerError::account_not_found(account_id)),
        Err(e) => {
            tracing::error!(account_id, error = %e, "failed to lock account");
            Err(e.into())
        }
    }
}
