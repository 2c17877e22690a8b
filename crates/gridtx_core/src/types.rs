//! Core type definitions for the coordinator.

use std::fmt;

/// Internal numeric handle of a transaction.
///
/// Handles are assigned by a [`TransactionManager`](crate::TransactionManager),
/// increase monotonically and are never reused by the same manager. The
/// recovery registry accepts them as a shorter alternative to an [`Xid`](crate::Xid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Flags passed to [`Resource::start`](crate::Resource::start) and
/// [`Resource::end`](crate::Resource::end), following the X/Open XA values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceFlags(i32);

impl ResourceFlags {
    /// No flags set.
    pub const NO_FLAGS: Self = Self(0x0000_0000);
    /// Caller is joining an existing branch.
    pub const JOIN: Self = Self(0x0020_0000);
    /// Caller is resuming a suspended branch.
    pub const RESUME: Self = Self(0x0800_0000);
    /// Dissociate caller from the branch, work succeeded.
    pub const SUCCESS: Self = Self(0x0400_0000);
    /// Dissociate caller from the branch, work failed.
    pub const FAIL: Self = Self(0x2000_0000);
    /// Suspend the association.
    pub const SUSPEND: Self = Self(0x0200_0000);

    /// Creates flags from a raw XA value.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw XA value.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}
