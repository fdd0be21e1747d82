//! txn_ledger - Two-Account Fund Transfers
//!
//! Moves funds between ledger accounts with row-locked atomic commits and
//! keeps a read-through cache coherent with the authoritative store.
//!
//! # Modules
//!
//! - [`money`] - Exact decimal arithmetic over decimal text
//! - [`cache`] - Cache-aside TTL store for account and transfer snapshots
//! - [`collapse`] - Request collapsing for concurrent identical reads
//! - [`store`] - Authoritative store seam (PostgreSQL, in-process)
//! - [`account`] - Account creation and reads
//! - [`transfer`] - Transfer engine, ledger lookups, validation
//! - [`service`] - `LedgerService` composition root
//! - [`gateway`] - axum HTTP surface

// Core leaves - no internal dependencies
pub mod error;
pub mod models;
pub mod money;

pub mod cache;
pub mod collapse;
pub mod store;

// Domain
pub mod account;
pub mod service;
pub mod transfer;

// Outer layers
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use cache::{CacheStore, TtlCache};
pub use error::LedgerError;
pub use models::{
    AccountCreated, AccountSnapshot, CreateAccountRequest, TransferRecord, TransferRequest,
};
pub use service::{LedgerService, LedgerSettings};
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
