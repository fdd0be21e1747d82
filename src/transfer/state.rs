//! Transfer Engine Phases
//!
//! ```text
//! Pending -> Locked -> Validated -> Committed -> CacheSynced
//!    |         |           |
//!    +---------+-----------+--> RolledBack
//! ```
//!
//! `Committed` is the point of no return: once reached, the transfer is
//! durable and reported as success whatever happens to the cache.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    /// Transaction opened, no locks yet
    Pending,

    /// Both rows locked in ascending account id order
    Locked,

    /// Source balance covers the amount
    Validated,

    /// Transaction committed
    Committed,

    /// Post-commit cache refresh attempted
    CacheSynced,

    /// Terminal: nothing was applied
    RolledBack,
}

impl TransferPhase {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::CacheSynced | TransferPhase::RolledBack)
    }

    /// The balance mutation is durable
    #[inline]
    pub fn is_committed(&self) -> bool {
        matches!(self, TransferPhase::Committed | TransferPhase::CacheSynced)
    }

    pub fn can_transition_to(&self, next: TransferPhase) -> bool {
        use TransferPhase::*;
        matches!(
            (self, next),
            (Pending, Locked)
                | (Locked, Validated)
                | (Validated, Committed)
                | (Committed, CacheSynced)
                | (Pending | Locked | Validated, RolledBack)
        )
    }

    /// Move to `next`, logging the step.
    ///
    /// # Panics
    /// On a transition the diagram above does not allow.
    pub fn advance(&mut self, next: TransferPhase) {
        assert!(
            self.can_transition_to(next),
            "illegal transfer phase transition {} -> {}",
            self,
            next
        );
        tracing::debug!(from = %self, to = %next, "transfer phase");
        *self = next;
    }

    /// Get human-readable phase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Pending => "PENDING",
            TransferPhase::Locked => "LOCKED",
            TransferPhase::Validated => "VALIDATED",
            TransferPhase::Committed => "COMMITTED",
            TransferPhase::CacheSynced => "CACHE_SYNCED",
            TransferPhase::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
