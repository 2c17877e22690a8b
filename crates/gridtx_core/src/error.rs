//! Error types for the transaction coordinator.

use crate::resource::ResourceError;
use crate::types::TransactionId;
use crate::xid::Xid;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type for coordinator operations.
pub type TxResult<T> = Result<T, TxError>;

/// Boxed error used for failure causes recorded by a transaction.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the transaction coordinator.
///
/// Participant failures never escape as raw [`ResourceError`]s: they are
/// classified by the transaction and reported through one of these variants.
#[derive(Debug, Error)]
pub enum TxError {
    /// An argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The operation is not permitted in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The transaction is marked for rollback and accepts no further work.
    #[error("transaction is rollback only: {message}")]
    RollbackOnly {
        /// Description of the rollback cause.
        message: String,
        /// Error that forced the rollback-only mark, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A participant failed in a way that is not a recognized protocol outcome.
    #[error("coordinator failure: {message}")]
    CoordinatorFailure {
        /// Description of the failure.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The transaction rolled back instead of committing.
    #[error("transaction rolled back: {message}")]
    Rollback {
        /// Description of the first recorded rollback cause.
        message: String,
        /// Error that caused the rollback, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Every failing participant heuristically decided the same outcome.
    #[error("heuristic rollback")]
    HeuristicRollback {
        /// Last participant error observed during phase two.
        #[source]
        source: Option<ResourceError>,
    },

    /// Participants disagree on the outcome, or phase two failed unexpectedly.
    #[error("heuristic mixed outcome")]
    HeuristicMixed {
        /// Last participant error observed during phase two.
        #[source]
        source: Option<ResourceError>,
    },

    /// The operation is not supported by this coordinator.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// No in-doubt transaction matches the given identifier.
    #[error("transaction not found: {key}")]
    TransactionNotFound {
        /// Rendering of the identifier that was looked up.
        key: String,
    },
}

impl TxError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a rollback-only error without a cause.
    pub fn rollback_only(message: impl Into<String>) -> Self {
        Self::RollbackOnly {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a coordinator failure wrapping a participant error.
    pub fn coordinator_failure(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::CoordinatorFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a rollback error without a cause.
    pub fn rollback(message: impl Into<String>) -> Self {
        Self::Rollback {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a rollback error caused by `source`.
    pub fn rollback_caused_by(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Rollback {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }

    /// Creates a not found error for an [`Xid`] lookup.
    pub fn xid_not_found(xid: &Xid) -> Self {
        Self::TransactionNotFound {
            key: xid.to_string(),
        }
    }

    /// Creates a not found error for an internal id lookup.
    pub fn id_not_found(id: TransactionId) -> Self {
        Self::TransactionNotFound {
            key: id.to_string(),
        }
    }

    /// Returns true for the two heuristic outcomes.
    #[must_use]
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            Self::HeuristicRollback { .. } | Self::HeuristicMixed { .. }
        )
    }

    /// Returns the message of the rollback cause for [`TxError::Rollback`]
    /// and [`TxError::RollbackOnly`].
    #[must_use]
    pub fn rollback_message(&self) -> Option<&str> {
        match self {
            Self::Rollback { message, .. } | Self::RollbackOnly { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceErrorKind;

    #[test]
    fn rollback_keeps_source() {
        let cause = ResourceError::new(ResourceErrorKind::Rollback(100), "db", "deadlock");
        let err = TxError::rollback_caused_by("prepare failed", cause);

        let source = err.source().expect("source");
        let resource = source.downcast_ref::<ResourceError>().expect("resource error");
        assert_eq!(resource.message(), "deadlock");
        assert_eq!(err.rollback_message(), Some("prepare failed"));
    }

    #[test]
    fn heuristic_classification() {
        assert!(TxError::HeuristicMixed { source: None }.is_heuristic());
        assert!(TxError::HeuristicRollback { source: None }.is_heuristic());
        assert!(!TxError::rollback("x").is_heuristic());
    }

    #[test]
    fn not_found_renders_id() {
        let err = TxError::id_not_found(TransactionId::new(7));
        assert_eq!(err.to_string(), "transaction not found: txn:7");
    }
}
