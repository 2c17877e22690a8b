//! Transaction manager.

use crate::config::CoordinatorConfig;
use crate::error::{TxError, TxResult};
use crate::recovery::RecoveryRegistry;
use crate::stats::CoordinatorStats;
use crate::status::TransactionStatus;
use crate::transaction::state::Transaction;
use crate::types::TransactionId;
use crate::xid::Xid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// The association between one thread of control and its transaction.
///
/// Each logical thread of control (an OS thread, a task, a request) owns one
/// context and passes it to the [`TransactionManager`]. A context holds at
/// most one transaction; [`TransactionManager::suspend`] and
/// [`TransactionManager::resume`] move a transaction between contexts.
#[derive(Debug, Default)]
pub struct TransactionContext {
    current: Option<Arc<Transaction>>,
}

impl TransactionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the associated transaction, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.current.as_ref()
    }

    /// Returns true if a transaction that has not reached a terminal status
    /// is associated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|tx| !tx.status().is_terminal())
    }
}

/// Begins transactions and drives them to completion on behalf of a
/// [`TransactionContext`].
///
/// The manager:
/// - generates global identifiers with the configured format id
/// - assigns monotonically increasing internal ids
/// - hands heuristic outcomes to its [`RecoveryRegistry`]
///
/// There is no timeout watchdog: a transaction stays open until committed or
/// rolled back. A caller that needs a timeout can call
/// [`Transaction::set_rollback_only`] from its own timer thread.
pub struct TransactionManager {
    config: CoordinatorConfig,
    next_txid: AtomicU64,
    recovery: Arc<RecoveryRegistry>,
    stats: CoordinatorStats,
}

impl TransactionManager {
    /// Creates a transaction manager.
    pub fn new(config: CoordinatorConfig) -> Self {
        let recovery = Arc::new(RecoveryRegistry::new(config.max_in_doubt));
        Self {
            config,
            next_txid: AtomicU64::new(1),
            recovery,
            stats: CoordinatorStats::new(),
        }
    }

    /// Begins a transaction with a generated identifier and associates it
    /// with `ctx`.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if `ctx` already holds an unfinished
    /// transaction.
    pub fn begin(&self, ctx: &mut TransactionContext) -> TxResult<Arc<Transaction>> {
        self.begin_with_xid(ctx, Xid::generate(self.config.format_id))
    }

    /// Begins a transaction identified by `xid` and associates it with `ctx`.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if `ctx` already holds an unfinished
    /// transaction.
    pub fn begin_with_xid(
        &self,
        ctx: &mut TransactionContext,
        xid: Xid,
    ) -> TxResult<Arc<Transaction>> {
        if ctx.is_active() {
            return Err(TxError::illegal_state(
                "a transaction is already associated with this context",
            ));
        }

        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let txn = if self.config.retain_in_doubt {
            Transaction::with_recovery(id, xid, Arc::clone(&self.recovery))
        } else {
            Transaction::new(id, xid)
        };
        let txn = Arc::new(txn);
        debug!(id = %id, xid = %txn.xid(), "transaction begun");

        self.stats.record_begin();
        ctx.current = Some(Arc::clone(&txn));
        Ok(txn)
    }

    /// Commits the transaction associated with `ctx`.
    ///
    /// The context is dissociated whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if nothing is associated, otherwise any
    /// error of [`Transaction::commit`].
    pub fn commit(&self, ctx: &mut TransactionContext) -> TxResult<()> {
        let txn = Self::take(ctx)?;
        let result = txn.commit();
        self.stats.record_completion(txn.status());
        trace!(id = %txn.id(), status = %txn.status(), "commit finished");
        result
    }

    /// Rolls back the transaction associated with `ctx`.
    ///
    /// The context is dissociated whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if nothing is associated, otherwise any
    /// error of [`Transaction::rollback`].
    pub fn rollback(&self, ctx: &mut TransactionContext) -> TxResult<()> {
        let txn = Self::take(ctx)?;
        let result = txn.rollback();
        self.stats.record_completion(txn.status());
        trace!(id = %txn.id(), status = %txn.status(), "rollback finished");
        result
    }

    /// Marks the associated transaction rollback-only.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if nothing is associated or completion
    /// already started.
    pub fn set_rollback_only(&self, ctx: &TransactionContext) -> TxResult<()> {
        ctx.current
            .as_ref()
            .ok_or_else(|| TxError::illegal_state("no transaction associated with this context"))?
            .set_rollback_only()
    }

    /// Returns the status of the associated transaction, or
    /// [`TransactionStatus::NoTransaction`].
    #[must_use]
    pub fn status(&self, ctx: &TransactionContext) -> TransactionStatus {
        ctx.current
            .as_ref()
            .map_or(TransactionStatus::NoTransaction, |tx| tx.status())
    }

    /// Returns the associated transaction, if any.
    #[must_use]
    pub fn transaction(&self, ctx: &TransactionContext) -> Option<Arc<Transaction>> {
        ctx.current.clone()
    }

    /// Dissociates and returns the transaction of `ctx` without ending its
    /// resources.
    pub fn suspend(&self, ctx: &mut TransactionContext) -> Option<Arc<Transaction>> {
        let txn = ctx.current.take()?;
        trace!(id = %txn.id(), "transaction suspended");
        self.stats.record_suspend();
        Some(txn)
    }

    /// Associates `txn` with `ctx`, replacing any current association.
    pub fn resume(&self, ctx: &mut TransactionContext, txn: Arc<Transaction>) {
        if let Some(previous) = ctx.current.as_ref() {
            debug!(previous = %previous.id(), next = %txn.id(), "resume replaces associated transaction");
        }
        trace!(id = %txn.id(), "transaction resumed");
        self.stats.record_resume();
        ctx.current = Some(txn);
    }

    /// Transaction timeouts are not supported by this coordinator.
    ///
    /// # Errors
    ///
    /// Always returns [`TxError::NotSupported`].
    pub fn set_transaction_timeout(&self, _seconds: u32) -> TxResult<()> {
        Err(TxError::not_supported("set_transaction_timeout"))
    }

    /// Returns the in-doubt transaction registry.
    #[must_use]
    pub fn recovery(&self) -> &Arc<RecoveryRegistry> {
        &self.recovery
    }

    /// Returns the outcome counters.
    #[must_use]
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn take(ctx: &mut TransactionContext) -> TxResult<Arc<Transaction>> {
        ctx.current
            .take()
            .ok_or_else(|| TxError::illegal_state("no transaction associated with this context"))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("format_id", &self.config.format_id)
            .field("in_doubt", &self.recovery.len())
            .finish_non_exhaustive()
    }
}
