//! # gridtx Testkit
//!
//! Test utilities for the gridtx coordinator.
//!
//! This crate provides:
//! - Scripted resources and synchronizations that record every call
//! - Property-based test generators using proptest
//! - Stress testing utilities
//! - A tracing subscriber for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridtx_testkit::prelude::*;
//!
//! #[test]
//! fn commits_two_participants() {
//!     let log = CallLog::new();
//!     let tm = TransactionManager::default();
//!     let mut ctx = TransactionContext::new();
//!     let txn = tm.begin(&mut ctx).unwrap();
//!     txn.enlist_resource(MockResource::new("a", &log).shared()).unwrap();
//!     tm.commit(&mut ctx).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use gridtx_core::{
        ResourceErrorKind, TransactionContext, TransactionManager, TransactionStatus, TxError,
        Vote, Xid,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
