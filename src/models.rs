// models.rs - Account and transfer types exchanged with callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Committed view of an account. Also the cached `account:<id>` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: i64,
    /// Canonical decimal text
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub account_id: i64,
    pub initial_balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub account_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: String,
}

/// Immutable ledger entry. Also the cached `transfer:<id>` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Store-assigned id, returned to callers as the transaction id
    pub transaction_id: i64,
    pub source_account_id: i64,
    pub destination_account_id: i64,
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_json_shape() {
        let req: TransferRequest = serde_json::from_str(
            r#"{"source_account_id":1001,"destination_account_id":2002,"amount":"150.00"}"#,
        )
        .unwrap();
        assert_eq!(req.source_account_id, 1001);
        assert_eq!(req.amount, "150.00");
    }

    #[test]
    fn test_snapshot_cache_encoding() {
        let snapshot = AccountSnapshot {
            account_id: 1001,
            balance: "350".into(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"account_id":1001,"balance":"350"}"#);
        assert_eq!(serde_json::from_str::<AccountSnapshot>(&json).unwrap(), snapshot);
    }
}
