//! Ledger Service
//!
//! Composition root of the core. Built once from an injected store and
//! cache; the gateway and the binary only ever talk to this type.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{AccountRepository, AccountService};
use crate::cache::{CacheStore, DEFAULT_TTL, WriteFence};
use crate::error::LedgerError;
use crate::models::{
    AccountCreated, AccountSnapshot, CreateAccountRequest, TransferRecord, TransferRequest,
};
use crate::store::LedgerStore;
use crate::transfer::{TransferEngine, TransferRepository, TransferService};

/// Tunables shared by the repositories and the transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub account_ttl: Duration,
    pub transfer_ttl: Duration,
    /// Deadline for a single store round trip or transfer transaction
    pub request_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            account_ttl: DEFAULT_TTL,
            transfer_ttl: DEFAULT_TTL,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Liveness of the store and the cache
pub struct HealthProbe {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
}

impl HealthProbe {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    pub async fn check(&self) -> Result<(), LedgerError> {
        if let Err(e) = self.store.ping().await {
            tracing::error!(store = self.store.name(), error = %e, "store ping failed");
            return Err(LedgerError::Internal(format!("store unavailable: {}", e)));
        }
        if let Err(e) = self.cache.ping().await {
            tracing::error!(error = %e, "cache ping failed");
            return Err(LedgerError::Internal(format!("cache unavailable: {}", e)));
        }
        Ok(())
    }
}

pub struct LedgerService {
    accounts: AccountService,
    transfers: TransferService,
    health: HealthProbe,
    backend: &'static str,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        settings: LedgerSettings,
    ) -> Self {
        // Shared by the only account writer and the account cache fills
        let fence = Arc::new(WriteFence::new());
        let accounts = AccountService::new(AccountRepository::new(
            store.clone(),
            cache.clone(),
            fence.clone(),
            &settings,
        ));
        let transfers = TransferService::new(
            TransferEngine::new(store.clone(), cache.clone(), fence, &settings),
            TransferRepository::new(store.clone(), cache.clone(), &settings),
        );
        let backend = store.name();

        Self {
            accounts,
            transfers,
            health: HealthProbe::new(store, cache),
            backend,
        }
    }

    /// Name of the store backend, for logs and the health endpoint
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub async fn create_account(
        &self,
        req: &CreateAccountRequest,
    ) -> Result<AccountCreated, LedgerError> {
        self.accounts.create_account(req).await
    }

    pub async fn get_account(&self, account_id: i64) -> Result<AccountSnapshot, LedgerError> {
        self.accounts.get_account(account_id).await
    }

    pub async fn transfer(&self, req: &TransferRequest) -> Result<TransferRecord, LedgerError> {
        self.transfers.process_transfer(req).await
    }

    pub async fn get_transfer(&self, transaction_id: i64) -> Result<TransferRecord, LedgerError> {
        self.transfers.get_transfer(transaction_id).await
    }

    pub async fn health_check(&self) -> Result<(), LedgerError> {
        self.health.check().await
    }
}
