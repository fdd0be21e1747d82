//! Transfer Service
//!
//! Validates transfer requests before the engine opens a transaction and
//! serves ledger lookups.

use crate::account::service::validate_account_id;
use crate::error::LedgerError;
use crate::models::{TransferRecord, TransferRequest};
use crate::money;

use super::engine::TransferEngine;
use super::repository::TransferRepository;

pub struct TransferService {
    engine: TransferEngine,
    repository: TransferRepository,
}

impl TransferService {
    pub fn new(engine: TransferEngine, repository: TransferRepository) -> Self {
        Self { engine, repository }
    }

    #[tracing::instrument(
        skip(self, req),
        fields(
            source = req.source_account_id,
            destination = req.destination_account_id,
        ),
        err
    )]
    pub async fn process_transfer(
        &self,
        req: &TransferRequest,
    ) -> Result<TransferRecord, LedgerError> {
        let req = validate_transfer(req)?;
        self.engine.execute(&req).await
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_transfer(&self, transaction_id: i64) -> Result<TransferRecord, LedgerError> {
        if transaction_id <= 0 {
            return Err(LedgerError::validation(format!(
                "transaction_id must be positive, got {}",
                transaction_id
            )));
        }
        self.repository.get_transfer_by_id(transaction_id).await
    }
}

/// Check a transfer request and return it with the amount in canonical form.
pub fn validate_transfer(req: &TransferRequest) -> Result<TransferRequest, LedgerError> {
    validate_account_id(req.source_account_id, "source_account_id")?;
    validate_account_id(req.destination_account_id, "destination_account_id")?;
    if req.source_account_id == req.destination_account_id {
        return Err(LedgerError::validation(
            "source and destination accounts must differ",
        ));
    }

    let raw = req.amount.trim();
    if raw.is_empty() {
        return Err(LedgerError::validation("amount is required"));
    }
    let amount =
        money::normalize(raw).map_err(|e| LedgerError::validation(format!("amount: {}", e)))?;
    if !money::greater_than(&amount, "0") {
        return Err(LedgerError::validation("amount must be greater than zero"));
    }

    Ok(TransferRequest {
        amount,
        ..req.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: i64, destination: i64, amount: &str) -> TransferRequest {
        TransferRequest {
            source_account_id: source,
            destination_account_id: destination,
            amount: amount.into(),
        }
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let req = validate_transfer(&request(1001, 2002, " 150.00 ")).unwrap();
        assert_eq!(req.amount, "150");
        assert_eq!(req.source_account_id, 1001);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (request(0, 2002, "1"), "source_account_id"),
            (request(1001, -3, "1"), "destination_account_id"),
            (request(1001, 1001, "1"), "must differ"),
            (request(1001, 2002, ""), "amount is required"),
            (request(1001, 2002, "1e3"), "amount:"),
            (request(1001, 2002, "0.00"), "greater than zero"),
            (request(1001, 2002, "-10"), "greater than zero"),
        ];
        for (req, expected) in cases {
            match validate_transfer(&req) {
                Err(LedgerError::Validation(msg)) => {
                    assert!(msg.contains(expected), "{:?}: {}", req, msg)
                }
                other => panic!("{:?} should fail validation, got {:?}", req, other),
            }
        }
    }
}
