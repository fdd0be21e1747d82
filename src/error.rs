//! Ledger Error Types
//!
//! One taxonomy for every core operation. Each variant maps to a distinct
//! response category so no failure is ambiguous to the caller.

use thiserror::Error;

use crate::money::MoneyError;
use crate::store::StoreError;

/// Ledger error types
///
/// `Clone` because a collapsed load fans the same result out to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed or out-of-range input. Raised before any I/O.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate account creation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Source balance below the requested amount. Nothing was mutated.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Store or infrastructure failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn account_not_found(account_id: i64) -> Self {
        LedgerError::NotFound(format!("account {}", account_id))
    }

    pub fn transfer_not_found(transaction_id: i64) -> Self {
        LedgerError::NotFound(format!("transfer {}", transaction_id))
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_FAILED",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::Conflict(_) => 409,
            LedgerError::InsufficientFunds => 422,
            LedgerError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(what) => LedgerError::Conflict(what),
            other => LedgerError::Internal(other.to_string()),
        }
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        LedgerError::Validation(e.to_string())
    }
}
