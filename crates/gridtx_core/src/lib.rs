//! # gridtx core
//!
//! Embedded two-phase-commit transaction coordinator.
//!
//! This crate provides:
//! - [`Xid`] global transaction identifiers with a fixed binary encoding
//! - the [`Resource`] and [`Synchronization`] participant traits
//! - [`Transaction`], the 2PC state machine with heuristic outcome handling
//! - [`TransactionManager`], which binds transactions to explicit
//!   [`TransactionContext`] values
//! - [`RecoveryRegistry`], which retains in-doubt transactions for forced
//!   resolution
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridtx_core::{TransactionContext, TransactionManager};
//!
//! let tm = TransactionManager::default();
//! let mut ctx = TransactionContext::new();
//! let txn = tm.begin(&mut ctx)?;
//! txn.enlist_resource(cache_resource)?;
//! txn.enlist_resource(store_resource)?;
//! tm.commit(&mut ctx)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod recovery;
mod resource;
mod stats;
mod status;
mod synchronization;
mod transaction;
mod types;
mod xid;

pub use config::{CoordinatorConfig, DEFAULT_FORMAT_ID};
pub use error::{BoxError, TxError, TxResult};
pub use recovery::{InDoubtTransaction, RecoveryRegistry};
pub use resource::{
    Resource, ResourceError, ResourceErrorKind, ResourceRef, ResourceResult, Vote,
    ROLLBACK_CODE_BASE, ROLLBACK_CODE_END,
};
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use status::TransactionStatus;
pub use synchronization::{FnSynchronization, Synchronization, SynchronizationRef};
pub use transaction::{
    aggregate, Aggregate, Outcome, Transaction, TransactionContext, TransactionManager,
};
pub use types::{ResourceFlags, TransactionId};
pub use xid::{Xid, XidLike};
