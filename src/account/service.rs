//! Account Service
//!
//! Input validation in front of [`AccountRepository`]. Everything rejected
//! here is rejected before any I/O.

use crate::error::LedgerError;
use crate::models::{AccountCreated, AccountSnapshot, CreateAccountRequest};
use crate::money;

use super::repository::AccountRepository;

pub struct AccountService {
    repository: AccountRepository,
}

impl AccountService {
    pub fn new(repository: AccountRepository) -> Self {
        Self { repository }
    }

    #[tracing::instrument(skip(self, req), fields(account_id = req.account_id), err)]
    pub async fn create_account(
        &self,
        req: &CreateAccountRequest,
    ) -> Result<AccountCreated, LedgerError> {
        let initial_balance = validate_create(req)?;
        let snapshot = self
            .repository
            .create_account(req.account_id, &initial_balance)
            .await?;
        Ok(AccountCreated {
            account_id: snapshot.account_id,
        })
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_account(&self, account_id: i64) -> Result<AccountSnapshot, LedgerError> {
        validate_account_id(account_id, "account_id")?;
        self.repository.get_account_by_id(account_id).await
    }
}

pub(crate) fn validate_account_id(account_id: i64, field: &str) -> Result<(), LedgerError> {
    if account_id <= 0 {
        return Err(LedgerError::validation(format!(
            "{} must be positive, got {}",
            field, account_id
        )));
    }
    Ok(())
}

/// Returns the initial balance in canonical form.
fn validate_create(req: &CreateAccountRequest) -> Result<String, LedgerError> {
    validate_account_id(req.account_id, "account_id")?;

    let raw = req.initial_balance.trim();
    if raw.is_empty() {
        return Err(LedgerError::validation("initial_balance is required"));
    }
    let balance = money::normalize(raw)
        .map_err(|e| LedgerError::validation(format!("initial_balance: {}", e)))?;
    if money::less_than(&balance, "0") {
        return Err(LedgerError::validation("initial_balance must not be negative"));
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{TtlCache, WriteFence};
    use crate::service::LedgerSettings;
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use std::sync::Arc;

    fn service() -> (Arc<MemoryLedgerStore>, AccountService) {
        let store = Arc::new(MemoryLedgerStore::new());
        let repository = AccountRepository::new(
            store.clone(),
            Arc::new(TtlCache::default()),
            Arc::new(WriteFence::new()),
            &LedgerSettings::default(),
        );
        (store, AccountService::new(repository))
    }

    fn create(account_id: i64, initial_balance: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            account_id,
            initial_balance: initial_balance.into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, svc) = service();
        let created = svc.create_account(&create(1001, " 500.00 ")).await.unwrap();
        assert_eq!(created, AccountCreated { account_id: 1001 });

        let account = svc.get_account(1001).await.unwrap();
        assert_eq!(account.balance, "500");
    }

    #[tokio::test]
    async fn test_zero_balance_allowed() {
        let (_, svc) = service();
        svc.create_account(&create(1, "0")).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_create_requests_touch_nothing() {
        let (store, svc) = service();
        for req in [
            create(0, "10"),
            create(-1, "10"),
            create(1, ""),
            create(1, "   "),
            create(1, "abc"),
            create(1, "-0.01"),
        ] {
            let err = svc.create_account(&req).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "{:?}", req);
        }
        assert_eq!(store.find_account(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let (_, svc) = service();
        svc.create_account(&create(1001, "1")).await.unwrap();
        let err = svc.create_account(&create(1001, "1")).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_get_validates_and_reports_missing() {
        let (store, svc) = service();
        assert!(matches!(
            svc.get_account(0).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(store.account_reads(), 0);

        assert_eq!(
            svc.get_account(9999).await,
            Err(LedgerError::account_not_found(9999))
        );
    }
}
