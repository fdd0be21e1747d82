//! HTTP handlers
//!
//! Thin adapters: decode, call [`LedgerService`](crate::service::LedgerService),
//! wrap the result in the response envelope. Malformed bodies and path
//! parameters are answered with 400 in the same envelope.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use serde::Serialize;

use super::state::AppState;
use super::types::{ApiError, ApiResponse, ApiResult, created, ok};
use crate::models::{
    AccountCreated, AccountSnapshot, CreateAccountRequest, TransferRecord, TransferRequest,
};

/// Health check response data
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub store: &'static str,
    /// Server timestamp in milliseconds
    pub timestamp_ms: u64,
}

/// GET /v1/health
///
/// - Healthy: 200 OK + {code: 0, data: {store, timestamp_ms}}
/// - Unhealthy: 503 + {code: 5001, msg: "unavailable"}
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    match state.ledger.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                store: state.ledger.backend(),
                timestamp_ms,
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: super::types::error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        ),
    }
}

/// POST /v1/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> ApiResult<AccountCreated> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let account = state.ledger.create_account(&req).await?;
    created(account)
}

/// GET /v1/accounts/{account_id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    account_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<AccountSnapshot> {
    let Path(account_id) = account_id.map_err(|e| ApiError::bad_request(e.body_text()))?;
    ok(state.ledger.get_account(account_id).await?)
}

/// POST /v1/transfers
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferRecord> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let record = state.ledger.transfer(&req).await?;
    created(record)
}

/// GET /v1/transfers/{transaction_id}
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    transaction_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<TransferRecord> {
    let Path(transaction_id) = transaction_id.map_err(|e| ApiError::bad_request(e.body_text()))?;
    ok(state.ledger.get_transfer(transaction_id).await?)
}
