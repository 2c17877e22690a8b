//! Two-phase-commit transactions.
//!
//! - [`Transaction`]: the protocol state machine over enlisted resources
//! - [`TransactionManager`]: associates transactions with explicit
//!   [`TransactionContext`] values
//! - [`aggregate`]: folds phase-two participant outcomes into one result

mod manager;
mod outcome;
mod state;

pub use manager::{TransactionContext, TransactionManager};
pub use outcome::{aggregate, Aggregate, Outcome};
pub use state::Transaction;
