//! Authoritative Store
//!
//! The transactional seam under the repositories and the transfer engine.
//!
//! - [`postgres`] - PostgreSQL via sqlx (`SELECT ... FOR UPDATE` row locks)
//! - [`memory`] - In-process store with per-account async row locks
//!
//! # Contract
//!
//! - `account_id` is unique; a duplicate insert fails with
//!   [`StoreError::UniqueViolation`].
//! - Writes made through a [`StoreTx`] are invisible to every other reader
//!   until `commit`, and discarded by `rollback` or by dropping the handle.
//! - `lock_account` holds an exclusive lock on the row until the
//!   transaction ends. Re-locking a row the same transaction already holds
//!   returns immediately.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::models::{AccountSnapshot, TransferRecord};
use crate::money::MoneyError;

/// Store error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("deadline exceeded: {0}")]
    Timeout(&'static str),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error()
            && db_err.is_unique_violation()
        {
            return StoreError::UniqueViolation(db_err.message().to_string());
        }
        StoreError::Backend(e.to_string())
    }
}

impl From<MoneyError> for StoreError {
    fn from(e: MoneyError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Account row as held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    /// Store-assigned surrogate key
    pub id: i64,
    pub account_id: i64,
    /// Canonical decimal text
    pub balance: String,
}

impl From<AccountRow> for AccountSnapshot {
    fn from(row: AccountRow) -> Self {
        AccountSnapshot {
            account_id: row.account_id,
            balance: row.balance,
        }
    }
}

/// Transfer ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRow {
    pub id: i64,
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

impl From<TransferRow> for TransferRecord {
    fn from(row: TransferRow) -> Self {
        TransferRecord {
            transaction_id: row.id,
            source_account_id: row.source_account_id,
            destination_account_id: row.destination_account_id,
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}

/// Ledger entry to append inside a transaction
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: String,
}

/// Authoritative store for accounts and the transfer ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn insert_account(&self, account_id: i64, balance: &str)
    -> Result<AccountRow, StoreError>;

    /// Committed state only; takes no lock.
    async fn find_account(&self, account_id: i64) -> Result<Option<AccountRow>, StoreError>;

    async fn find_transfer(&self, transfer_id: i64) -> Result<Option<TransferRow>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// One open transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait StoreTx: Send {
    /// Exclusive row lock by business id, returning the row as of the lock.
    async fn lock_account(&mut self, account_id: i64) -> Result<Option<AccountRow>, StoreError>;

    /// `id` is the surrogate key of a row locked by this transaction.
    async fn update_balance(&mut self, id: i64, balance: &str) -> Result<(), StoreError>;

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<TransferRow, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Bound a store call by `deadline`. Dropping the inner future on expiry
/// releases whatever it held (connections, row locks).
pub async fn within<T, E, F>(deadline: Duration, op: &'static str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StoreError>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, deadline_ms = deadline.as_millis() as u64, "store deadline exceeded");
            Err(StoreError::Timeout(op).into())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fault-injecting wrapper over [`MemoryLedgerStore`].

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct Faults {
        pub fail_commit: AtomicBool,
        pub fail_insert_transfer: AtomicBool,
        pub fail_find: AtomicBool,
        pub lock_delay_ms: AtomicU64,
        pub find_delay_ms: AtomicU64,
        /// Hold a finished account read before returning it
        pub find_stall_ms: AtomicU64,
    }

    #[derive(Default)]
    pub struct FaultyStore {
        pub inner: MemoryLedgerStore,
        pub faults: Arc<Faults>,
        pub begins: AtomicUsize,
        /// Account ids in the order rows were locked, across transactions
        pub lock_log: Arc<Mutex<Vec<i64>>>,
    }

    impl FaultyStore {
        pub fn locked_in_order(&self) -> Vec<i64> {
            self.lock_log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStore {
        fn name(&self) -> &'static str {
            "faulty"
        }

        async fn insert_account(
            &self,
            account_id: i64,
            balance: &str,
        ) -> Result<AccountRow, StoreError> {
            self.inner.insert_account(account_id, balance).await
        }

        async fn find_account(&self, account_id: i64) -> Result<Option<AccountRow>, StoreError> {
            let delay = self.faults.find_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.faults.fail_find.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".into()));
            }
            let row = self.inner.find_account(account_id).await?;
            let stall = self.faults.find_stall_ms.load(Ordering::SeqCst);
            if stall > 0 {
                tokio::time::sleep(Duration::from_millis(stall)).await;
            }
            Ok(row)
        }

        async fn find_transfer(
            &self,
            transfer_id: i64,
        ) -> Result<Option<TransferRow>, StoreError> {
            self.inner.find_transfer(transfer_id).await
        }

        async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FaultyTx {
                inner: self.inner.begin().await?,
                faults: Arc::clone(&self.faults),
                lock_log: Arc::clone(&self.lock_log),
            }))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    struct FaultyTx {
        inner: Box<dyn StoreTx>,
        faults: Arc<Faults>,
        lock_log: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl StoreTx for FaultyTx {
        async fn lock_account(
            &mut self,
            account_id: i64,
        ) -> Result<Option<AccountRow>, StoreError> {
            let delay = self.faults.lock_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let row = self.inner.lock_account(account_id).await?;
            self.lock_log.lock().unwrap().push(account_id);
            Ok(row)
        }

        async fn update_balance(&mut self, id: i64, balance: &str) -> Result<(), StoreError> {
            self.inner.update_balance(id, balance).await
        }

        async fn insert_transfer(
            &mut self,
            transfer: &NewTransfer,
        ) -> Result<TransferRow, StoreError> {
            if self.faults.fail_insert_transfer.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("foreign key violation".into()));
            }
            self.inner.insert_transfer(transfer).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self.faults.fail_commit.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("could not serialize access".into()));
            }
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }
}
