//! Transactional resource participants.
//!
//! A [`Resource`] is anything that can take part in two-phase commit: a local
//! cache, a remote store, another coordinator. The transaction owns a list of
//! `Arc<dyn Resource>` values and drives them in enlistment order.

use crate::types::ResourceFlags;
use crate::xid::Xid;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to an enlisted resource.
pub type ResourceRef = Arc<dyn Resource>;

/// Result type for participant operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Lowest XA rollback code (`XA_RBBASE`).
pub const ROLLBACK_CODE_BASE: i32 = 100;

/// Highest XA rollback code (`XA_RBEND`).
pub const ROLLBACK_CODE_END: i32 = 107;

/// A participant's answer to `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// The participant is prepared and must receive `commit` in phase two.
    Commit,
    /// The participant is finished; it must not be called again.
    ReadOnly,
}

/// Classification of a participant failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceErrorKind {
    /// The participant rolled back its branch. Carries an XA rollback code
    /// in `ROLLBACK_CODE_BASE..=ROLLBACK_CODE_END`.
    Rollback(i32),
    /// The participant heuristically committed.
    HeuristicCommit,
    /// The participant heuristically rolled back.
    HeuristicRollback,
    /// The participant partly committed and partly rolled back.
    HeuristicMixed,
    /// The participant has no record of the transaction.
    NotApplicable,
    /// Any other failure.
    Unexpected,
}

impl ResourceErrorKind {
    /// Returns true if this kind demands a rollback of the transaction.
    #[must_use]
    pub fn is_rollback(self) -> bool {
        matches!(self, Self::Rollback(code) if (ROLLBACK_CODE_BASE..=ROLLBACK_CODE_END).contains(&code))
    }

    /// Returns true for the three heuristic kinds.
    #[must_use]
    pub fn is_heuristic(self) -> bool {
        matches!(
            self,
            Self::HeuristicCommit | Self::HeuristicRollback | Self::HeuristicMixed
        )
    }
}

impl fmt::Display for ResourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rollback(code) => write!(f, "rollback({code})"),
            Self::HeuristicCommit => f.write_str("heuristic commit"),
            Self::HeuristicRollback => f.write_str("heuristic rollback"),
            Self::HeuristicMixed => f.write_str("heuristic mixed"),
            Self::NotApplicable => f.write_str("not applicable"),
            Self::Unexpected => f.write_str("unexpected"),
        }
    }
}

/// Error raised by a participant operation.
#[derive(Debug, Clone, Error)]
#[error("{kind} from {resource}: {message}")]
pub struct ResourceError {
    kind: ResourceErrorKind,
    resource: String,
    message: String,
}

impl ResourceError {
    /// Creates a resource error.
    pub fn new(
        kind: ResourceErrorKind,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates a rollback-class error with the generic `XA_RBROLLBACK` code.
    pub fn rollback(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ResourceErrorKind::Rollback(ROLLBACK_CODE_BASE),
            resource,
            message,
        )
    }

    /// Creates an unexpected error.
    pub fn unexpected(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::Unexpected, resource, message)
    }

    /// Returns the classification.
    #[must_use]
    pub fn kind(&self) -> ResourceErrorKind {
        self.kind
    }

    /// Returns the name of the failing resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns the failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Capability a transactional participant must implement.
///
/// Every call is synchronous and may block on I/O. The coordinator never
/// calls two operations of the same transaction concurrently.
pub trait Resource: Send + Sync {
    /// Associates the resource with the transaction branch `xid`.
    fn start(&self, xid: &Xid, flags: ResourceFlags) -> ResourceResult<()>;

    /// Ends the association started by [`Resource::start`].
    fn end(&self, xid: &Xid, flags: ResourceFlags) -> ResourceResult<()>;

    /// Asks the resource to vote on the outcome.
    fn prepare(&self, xid: &Xid) -> ResourceResult<Vote>;

    /// Commits the branch. `one_phase` is always false for this coordinator.
    fn commit(&self, xid: &Xid, one_phase: bool) -> ResourceResult<()>;

    /// Rolls back the branch.
    fn rollback(&self, xid: &Xid) -> ResourceResult<()>;

    /// Discards knowledge of a heuristically completed branch.
    fn forget(&self, xid: &Xid) -> ResourceResult<()>;

    /// Identity of the resource manager behind this participant, if known.
    fn resource_manager(&self) -> Option<&str> {
        None
    }

    /// Returns true if `other` is served by the same resource manager.
    ///
    /// The default compares [`Resource::resource_manager`] identities; two
    /// anonymous resources are never the same.
    fn is_same_resource_manager(&self, other: &dyn Resource) -> ResourceResult<bool> {
        Ok(match (self.resource_manager(), other.resource_manager()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
    }

    /// Name used in logs and error messages.
    fn name(&self) -> String {
        self.resource_manager()
            .map_or_else(|| "anonymous-resource".to_string(), str::to_string)
    }
}
