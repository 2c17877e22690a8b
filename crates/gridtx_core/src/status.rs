//! Transaction status.

use std::fmt;

/// Status of a transaction in the two-phase-commit state machine.
///
/// ```text
/// Active ──► MarkedRollback ─────────────────────► RollingBack ──► RolledBack
///   │              ▲                                    │
///   ▼              │ (prepare failed)                   ▼
/// Preparing ───────┘──► Prepared ──► Committing ──► Committed
///                                        │
///                                        └──────────► Unknown
/// ```
///
/// `Unknown` is reachable from both `Committing` and `RollingBack` when phase
/// two ends with a heuristic or unexpected participant outcome. A `Prepared`
/// transaction moves back to `MarkedRollback` when its second phase is
/// forced to roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Work may still be enlisted.
    Active,
    /// The only possible outcome is rollback.
    MarkedRollback,
    /// Participants are being asked to vote.
    Preparing,
    /// Every participant voted to commit.
    Prepared,
    /// Phase two commit in progress.
    Committing,
    /// The transaction committed.
    Committed,
    /// Phase two rollback in progress.
    RollingBack,
    /// The transaction rolled back.
    RolledBack,
    /// Participants disagree or failed; the outcome needs recovery.
    Unknown,
    /// Reported by the manager when no transaction is associated.
    NoTransaction,
}

impl TransactionStatus {
    /// Returns true once the transaction can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Unknown)
    }

    /// Returns true once completion has started.
    ///
    /// A done transaction refuses enlistment, registration,
    /// `set_rollback_only`, `commit` and `rollback`.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(
            self,
            Self::Preparing
                | Self::Prepared
                | Self::Committing
                | Self::Committed
                | Self::RollingBack
                | Self::RolledBack
                | Self::Unknown
        )
    }

    /// Returns true if the state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::MarkedRollback)
                | (Self::Active, Self::Preparing)
                | (Self::MarkedRollback, Self::RollingBack)
                | (Self::Preparing, Self::Prepared)
                | (Self::Preparing, Self::MarkedRollback)
                | (Self::Prepared, Self::MarkedRollback)
                | (Self::Prepared, Self::Committing)
                | (Self::Committing, Self::Committed)
                | (Self::Committing, Self::Unknown)
                | (Self::RollingBack, Self::RolledBack)
                | (Self::RollingBack, Self::Unknown)
        )
    }

    /// Returns the conventional upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::MarkedRollback => "MARKED_ROLLBACK",
            Self::Preparing => "PREPARING",
            Self::Prepared => "PREPARED",
            Self::Committing => "COMMITTING",
            Self::Committed => "COMMITTED",
            Self::RollingBack => "ROLLING_BACK",
            Self::RolledBack => "ROLLEDBACK",
            Self::Unknown => "UNKNOWN",
            Self::NoTransaction => "NO_TRANSACTION",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
