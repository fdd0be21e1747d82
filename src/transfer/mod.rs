//! Two-Account Transfers
//!
//! # State Machine
//!
//! ```text
//! PENDING → LOCKED → VALIDATED → COMMITTED → CACHE_SYNCED
//!    ↓         ↓          ↓
//!    └─────────┴──────────┴──→ ROLLED_BACK
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Canonical Lock Order**: rows are locked by ascending account id, so
//!    two transfers over the same pair can never wait on each other in a cycle
//! 2. **All-or-Nothing**: both balance updates and the ledger entry commit in
//!    one transaction or not at all
//! 3. **No Overdraft**: the funds check runs under the source row lock
//! 4. **Cache After Commit**: the cache is refreshed only once the commit is
//!    durable, and its failures never turn a committed transfer into an error

pub mod engine;
pub mod repository;
pub mod service;
pub mod state;

pub use engine::TransferEngine;
pub use repository::TransferRepository;
pub use service::{TransferService, validate_transfer};
pub use state::TransferPhase;
