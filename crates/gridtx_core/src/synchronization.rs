//! Completion callbacks.

use crate::error::BoxError;
use crate::status::TransactionStatus;
use std::sync::Arc;

/// Shared handle to a registered synchronization.
pub type SynchronizationRef = Arc<dyn Synchronization>;

/// Hooks invoked around transaction completion.
///
/// Callbacks run in registration order for both phases. A failing
/// `before_completion` forces the transaction to roll back but does not stop
/// the remaining callbacks from running.
pub trait Synchronization: Send + Sync {
    /// Called before the prepare phase starts.
    fn before_completion(&self) -> Result<(), BoxError>;

    /// Called once the transaction reached its final status.
    ///
    /// Errors are logged and discarded.
    fn after_completion(&self, status: TransactionStatus) -> Result<(), BoxError>;

    /// Name used in logs.
    fn name(&self) -> String {
        "synchronization".to_string()
    }
}

/// A [`Synchronization`] built from two closures.
pub struct FnSynchronization<B, A> {
    name: Option<String>,
    before: B,
    after: A,
}

impl<B, A> FnSynchronization<B, A>
where
    B: Fn() -> Result<(), BoxError> + Send + Sync,
    A: Fn(TransactionStatus) -> Result<(), BoxError> + Send + Sync,
{
    /// Creates a synchronization from `before` and `after` callbacks.
    pub fn new(before: B, after: A) -> Self {
        Self {
            name: None,
            before,
            after,
        }
    }

    /// Sets the name reported in logs and rollback causes.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<B, A> Synchronization for FnSynchronization<B, A>
where
    B: Fn() -> Result<(), BoxError> + Send + Sync,
    A: Fn(TransactionStatus) -> Result<(), BoxError> + Send + Sync,
{
    fn before_completion(&self) -> Result<(), BoxError> {
        (self.before)()
    }

    fn after_completion(&self, status: TransactionStatus) -> Result<(), BoxError> {
        (self.after)(status)
    }

    fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => "synchronization".to_string(),
        }
    }
}
