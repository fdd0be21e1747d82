//! In-Process Ledger Store
//!
//! Same contract as the PostgreSQL store, held in memory. Used when no
//! `postgres_url` is configured and throughout the test suite.
//!
//! Row locks are per-account `tokio::sync::Mutex`es held by the open
//! transaction. Balance updates and ledger inserts are staged on the
//! transaction and applied in one step under the table lock at commit, so
//! readers only ever see committed state.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use super::{AccountRow, LedgerStore, NewTransfer, StoreError, StoreTx, TransferRow};
use crate::money;

#[derive(Default)]
struct Tables {
    /// Keyed by business account id
    accounts: HashMap<i64, AccountRow>,
    transfers: BTreeMap<i64, TransferRow>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
    next_account_id: AtomicI64,
    next_transfer_id: AtomicI64,
    account_reads: AtomicUsize,
}

impl Shared {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Lock handle of an existing account. Accounts are never deleted, so
    /// the lock table stays as large as the account table.
    fn row_lock(
        &self,
        account_id: i64,
    ) -> Result<Option<Arc<tokio::sync::Mutex<()>>>, StoreError> {
        let tables = self.tables()?;
        if !tables.accounts.contains_key(&account_id) {
            return Ok(None);
        }
        let entry = self.row_locks.entry(account_id).or_default();
        Ok(Some(Arc::clone(entry.value())))
    }
}

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_account` calls served so far.
    pub fn account_reads(&self) -> usize {
        self.shared.account_reads.load(Ordering::SeqCst)
    }

    /// Number of committed ledger entries.
    pub fn transfer_count(&self) -> usize {
        self.shared.tables().map(|t| t.transfers.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_account(
        &self,
        account_id: i64,
        balance: &str,
    ) -> Result<AccountRow, StoreError> {
        let balance = money::normalize(balance)?;
        let mut tables = self.shared.tables()?;
        if tables.accounts.contains_key(&account_id) {
            return Err(StoreError::UniqueViolation(format!(
                "account_id {} already exists",
                account_id
            )));
        }

        let row = AccountRow {
            id: self.shared.next_account_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id,
            balance,
        };
        tables.accounts.insert(account_id, row.clone());
        Ok(row)
    }

    async fn find_account(&self, account_id: i64) -> Result<Option<AccountRow>, StoreError> {
        self.shared.account_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.shared.tables()?.accounts.get(&account_id).cloned())
    }

    async fn find_transfer(&self, transfer_id: i64) -> Result<Option<TransferRow>, StoreError> {
        Ok(self.shared.tables()?.transfers.get(&transfer_id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            guards: Vec::new(),
            locked: HashMap::new(),
            balances: HashMap::new(),
            transfers: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.shared.tables().map(|_| ())
    }
}

struct MemoryTx {
    shared: Arc<Shared>,
    /// Released when the transaction is dropped
    guards: Vec<OwnedMutexGuard<()>>,
    /// Surrogate id -> business id of every row this transaction locked
    locked: HashMap<i64, i64>,
    /// Staged balances by business id
    balances: HashMap<i64, String>,
    transfers: Vec<TransferRow>,
}

impl MemoryTx {
    fn current(&self, row: AccountRow) -> AccountRow {
        match self.balances.get(&row.account_id) {
            Some(balance) => AccountRow {
                balance: balance.clone(),
                ..row
            },
            None => row,
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_account(&mut self, account_id: i64) -> Result<Option<AccountRow>, StoreError> {
        if !self.locked.values().any(|&held| held == account_id) {
            let Some(row_lock) = self.shared.row_lock(account_id)? else {
                return Ok(None);
            };
            let guard = row_lock.lock_owned().await;
            let row = self.shared.tables()?.accounts.get(&account_id).cloned();
            let Some(row) = row else {
                return Ok(None);
            };
            self.guards.push(guard);
            self.locked.insert(row.id, account_id);
        }

        let row = self.shared.tables()?.accounts.get(&account_id).cloned();
        Ok(row.map(|r| self.current(r)))
    }

    async fn update_balance(&mut self, id: i64, balance: &str) -> Result<(), StoreError> {
        let account_id = *self
            .locked
            .get(&id)
            .ok_or_else(|| StoreError::Backend(format!("account row {} is not locked", id)))?;

        let balance = money::parse(balance)?;
        if balance.is_sign_negative() && !balance.is_zero() {
            return Err(StoreError::Backend(format!(
                "balance check violated for account row {}",
                id
            )));
        }
        self.balances.insert(account_id, money::canonical(balance));
        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> Result<TransferRow, StoreError> {
        let row = TransferRow {
            id: self.shared.next_transfer_id.fetch_add(1, Ordering::SeqCst) + 1,
            source_account_id: transfer.source_account_id,
            destination_account_id: transfer.destination_account_id,
            amount: money::normalize(&transfer.amount)?,
            created_at: Utc::now(),
        };
        self.transfers.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            shared,
            guards,
            balances,
            transfers,
            ..
        } = *self;

        {
            let mut tables = shared.tables()?;
            for (account_id, balance) in balances {
                if let Some(row) = tables.accounts.get_mut(&account_id) {
                    row.balance = balance;
                }
            }
            for transfer in transfers {
                tables.transfers.insert(transfer.id, transfer);
            }
        }

        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
