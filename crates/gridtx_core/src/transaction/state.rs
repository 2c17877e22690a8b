//! Transaction state machine.

use crate::error::{BoxError, TxError, TxResult};
use crate::recovery::RecoveryRegistry;
use crate::resource::{ResourceError, ResourceRef, Vote};
use crate::status::TransactionStatus;
use crate::synchronization::SynchronizationRef;
use crate::transaction::outcome::{aggregate, Aggregate, Outcome};
use crate::types::{ResourceFlags, TransactionId};
use crate::xid::Xid;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

const EXPLICIT_ROLLBACK_MESSAGE: &str = "transaction marked as rollback only";
const FORCED_ROLLBACK_MESSAGE: &str = "second phase forced to roll back";

/// An enlisted resource and the vote it cast in the prepare phase.
struct Enlisted {
    resource: ResourceRef,
    vote: Option<Vote>,
}

/// First rollback-triggering failure.
struct Failure {
    message: String,
    source: Option<BoxError>,
    /// Recorded by [`Transaction::run_commit`] with `force_rollback`; never
    /// reported to the caller.
    forced: bool,
}

/// State guarded by the transaction lock.
struct Control {
    xid: Xid,
    status: TransactionStatus,
    first_failure: Option<Failure>,
}

impl Control {
    fn transition(&mut self, next: TransactionStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        trace!(xid = %self.xid, from = %self.status, to = %next, "status transition");
        self.status = next;
    }

    /// Marks the transaction rollback-only. The first recorded cause wins.
    fn mark_rollback_only(&mut self, message: String, source: Option<BoxError>) {
        if self.status == TransactionStatus::MarkedRollback {
            return;
        }
        self.transition(TransactionStatus::MarkedRollback);
        if self.first_failure.is_none() {
            self.first_failure = Some(Failure {
                message,
                source,
                forced: false,
            });
        }
    }

    fn force_rollback(&mut self) {
        if self.status == TransactionStatus::MarkedRollback {
            return;
        }
        self.transition(TransactionStatus::MarkedRollback);
        if self.first_failure.is_none() {
            self.first_failure = Some(Failure {
                message: FORCED_ROLLBACK_MESSAGE.to_string(),
                source: None,
                forced: true,
            });
        }
    }
}

/// A two-phase-commit transaction.
///
/// Resources and synchronizations are enlisted while the transaction is
/// active. [`Transaction::commit`] then runs before-completion callbacks,
/// ends every resource, asks each to prepare in enlistment order and, if all
/// vote to commit, commits them in the same order.
///
/// A transaction is driven by one thread of control at a time. The only
/// operation that may race with protocol execution is
/// [`Transaction::set_rollback_only`].
pub struct Transaction {
    id: TransactionId,
    control: Mutex<Control>,
    resources: Mutex<Vec<Enlisted>>,
    synchronizations: Mutex<Vec<SynchronizationRef>>,
    recovery: Option<Arc<RecoveryRegistry>>,
}

impl Transaction {
    /// Creates an active transaction.
    #[must_use]
    pub fn new(id: TransactionId, xid: Xid) -> Self {
        Self {
            id,
            control: Mutex::new(Control {
                xid,
                status: TransactionStatus::Active,
                first_failure: None,
            }),
            resources: Mutex::new(Vec::with_capacity(2)),
            synchronizations: Mutex::new(Vec::with_capacity(2)),
            recovery: None,
        }
    }

    /// Creates an active transaction that reports heuristic outcomes to
    /// `recovery`.
    #[must_use]
    pub fn with_recovery(id: TransactionId, xid: Xid, recovery: Arc<RecoveryRegistry>) -> Self {
        Self {
            recovery: Some(recovery),
            ..Self::new(id, xid)
        }
    }

    /// Returns the internal handle.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the global identifier.
    #[must_use]
    pub fn xid(&self) -> Xid {
        self.control.lock().xid.clone()
    }

    /// Replaces the global identifier.
    ///
    /// Ignored once a resource or synchronization has been enlisted, since
    /// they were already told the previous identifier. Returns whether the
    /// identifier was replaced.
    pub fn set_xid(&self, xid: Xid) -> bool {
        let mut ctl = self.control.lock();
        if self.resources.lock().is_empty() && self.synchronizations.lock().is_empty() {
            ctl.xid = xid;
            true
        } else {
            false
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.control.lock().status
    }

    /// Returns the enlisted resources in enlistment order.
    pub fn enlisted_resources(&self) -> Vec<ResourceRef> {
        self.resources
            .lock()
            .iter()
            .map(|e| Arc::clone(&e.resource))
            .collect()
    }

    /// Returns the registered synchronizations in registration order.
    pub fn synchronizations(&self) -> Vec<SynchronizationRef> {
        self.synchronizations.lock().clone()
    }

    /// Enlists a resource and starts its branch.
    ///
    /// A resource whose resource manager is already enlisted is ignored.
    ///
    /// # Errors
    ///
    /// - [`TxError::RollbackOnly`] if the transaction is marked for rollback,
    ///   or if `start` answered with a rollback code (the transaction is then
    ///   marked rollback-only).
    /// - [`TxError::IllegalState`] once completion has started.
    /// - [`TxError::CoordinatorFailure`] if `start` failed otherwise.
    pub fn enlist_resource(&self, resource: ResourceRef) -> TxResult<()> {
        let xid = {
            let ctl = self.control.lock();
            trace!(xid = %ctl.xid, resource = %resource.name(), "enlist resource");
            check_status_before_register(ctl.status, "resource")?;
            ctl.xid.clone()
        };

        for existing in self.enlisted_resources() {
            match existing.is_same_resource_manager(resource.as_ref()) {
                Ok(true) => {
                    debug!(xid = %xid, resource = %resource.name(), "ignoring resource, already enlisted");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    trace!(xid = %xid, error = %e, "resource manager comparison failed, treating as distinct");
                }
            }
        }

        {
            let _ctl = self.control.lock();
            self.resources.lock().push(Enlisted {
                resource: Arc::clone(&resource),
                vote: None,
            });
        }

        trace!(xid = %xid, resource = %resource.name(), "start");
        if let Err(e) = resource.start(&xid, ResourceFlags::NO_FLAGS) {
            error!(xid = %xid, resource = %resource.name(), error = %e, "failed to enlist resource");
            if e.kind().is_rollback() {
                let message = format!(
                    "resource {} rolled back the transaction on start",
                    resource.name()
                );
                self.mark_rollback_only(message.clone(), Some(Box::new(e.clone())));
                return Err(TxError::RollbackOnly {
                    message,
                    source: Some(Box::new(e)),
                });
            }
            return Err(TxError::coordinator_failure(
                format!("start failed for resource {}", resource.name()),
                e,
            ));
        }
        Ok(())
    }

    /// Registers a completion callback.
    ///
    /// # Errors
    ///
    /// [`TxError::RollbackOnly`] if marked for rollback;
    /// [`TxError::IllegalState`] once completion has started.
    pub fn register_synchronization(&self, sync: SynchronizationRef) -> TxResult<()> {
        let ctl = self.control.lock();
        trace!(xid = %ctl.xid, sync = %sync.name(), "register synchronization");
        check_status_before_register(ctl.status, "synchronization")?;
        self.synchronizations.lock().push(sync);
        Ok(())
    }

    /// Marks the transaction so that its only possible outcome is rollback.
    ///
    /// Safe to call from another thread while the owner is running the
    /// protocol.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] once completion has started.
    pub fn set_rollback_only(&self) -> TxResult<()> {
        let mut ctl = self.control.lock();
        trace!(xid = %ctl.xid, "set rollback only");
        if ctl.status.is_done() {
            return Err(TxError::illegal_state(
                "transaction is done, cannot change status",
            ));
        }
        ctl.mark_rollback_only(EXPLICIT_ROLLBACK_MESSAGE.to_string(), None);
        Ok(())
    }

    /// Runs two-phase commit.
    ///
    /// # Errors
    ///
    /// - [`TxError::IllegalState`] if completion already started.
    /// - [`TxError::Rollback`] if the transaction rolled back; carries the
    ///   first recorded cause.
    /// - [`TxError::HeuristicRollback`] / [`TxError::HeuristicMixed`] per the
    ///   phase-two outcome of the participants.
    pub fn commit(&self) -> TxResult<()> {
        let xid = self.xid();
        trace!(xid = %xid, "commit invoked");
        self.ensure_not_done("commit")?;
        self.prepare_phase(&xid);
        self.completion_phase(&xid)
    }

    /// Runs only the first phase: before-completion callbacks, `end` on
    /// every resource and the prepare votes.
    ///
    /// Returns `Ok(true)` if every resource is prepared; the transaction is
    /// then left `Prepared` until [`Transaction::run_commit`] decides it.
    /// Returns `Ok(false)` if it is marked rollback-only.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if completion already started.
    pub fn run_prepare(&self) -> TxResult<bool> {
        let xid = self.xid();
        trace!(xid = %xid, "run_prepare invoked");
        self.ensure_not_done("prepare")?;
        Ok(self.prepare_phase(&xid))
    }

    /// Runs the second phase of a transaction left by
    /// [`Transaction::run_prepare`].
    ///
    /// With `force_rollback` a prepared transaction is rolled back instead
    /// of committed. The forced cause is not reported, but a rollback cause
    /// recorded earlier still is.
    ///
    /// # Errors
    ///
    /// - [`TxError::IllegalState`] unless the transaction is `Prepared` or
    ///   marked rollback-only.
    /// - otherwise the errors of [`Transaction::commit`].
    pub fn run_commit(&self, force_rollback: bool) -> TxResult<()> {
        let xid = self.xid();
        trace!(xid = %xid, force_rollback, "run_commit invoked");
        {
            let mut ctl = self.control.lock();
            match ctl.status {
                TransactionStatus::Prepared | TransactionStatus::MarkedRollback => {}
                status => {
                    return Err(TxError::illegal_state(format!(
                        "cannot run the second phase of a {status} transaction"
                    )));
                }
            }
            if force_rollback {
                ctl.force_rollback();
            }
        }
        self.completion_phase(&xid)
    }

    /// Rolls back the transaction.
    ///
    /// A rollback is the successful outcome of this call, so
    /// [`TxError::Rollback`] is never returned.
    ///
    /// # Errors
    ///
    /// [`TxError::IllegalState`] if completion already started; a heuristic
    /// error if participants disagree during rollback.
    pub fn rollback(&self) -> TxResult<()> {
        let xid = self.xid();
        trace!(xid = %xid, "rollback invoked");
        {
            let mut ctl = self.control.lock();
            if ctl.status.is_done() {
                return Err(TxError::illegal_state(
                    "transaction is done, cannot rollback transaction",
                ));
            }
            if ctl.status != TransactionStatus::MarkedRollback {
                ctl.transition(TransactionStatus::MarkedRollback);
            }
        }
        self.end_resources(&xid);
        match self.completion_phase(&xid) {
            Err(TxError::Rollback { message, .. }) => {
                trace!(xid = %xid, cause = %message, "rollback cause ignored on explicit rollback");
                Ok(())
            }
            other => other,
        }
    }

    fn ensure_not_done(&self, operation: &str) -> TxResult<()> {
        if self.status().is_done() {
            return Err(TxError::illegal_state(format!(
                "transaction is done, cannot {operation} transaction"
            )));
        }
        Ok(())
    }

    fn mark_rollback_only(&self, message: String, source: Option<BoxError>) {
        self.control.lock().mark_rollback_only(message, source);
    }

    /// Runs before-completion, ends all resources and collects votes.
    ///
    /// Returns false if the transaction must roll back.
    fn prepare_phase(&self, xid: &Xid) -> bool {
        trace!(xid = %xid, "prepare phase");
        self.notify_before_completion(xid);
        self.end_resources(xid);

        {
            let mut ctl = self.control.lock();
            if ctl.status == TransactionStatus::MarkedRollback {
                return false;
            }
            ctl.transition(TransactionStatus::Preparing);
        }

        for (index, resource) in self.enlisted_resources().into_iter().enumerate() {
            trace!(xid = %xid, resource = %resource.name(), "prepare");
            match resource.prepare(xid) {
                Ok(vote) => {
                    if let Some(entry) = self.resources.lock().get_mut(index) {
                        entry.vote = Some(vote);
                    }
                }
                Err(e) if e.kind().is_rollback() => {
                    trace!(xid = %xid, resource = %resource.name(), error = %e, "resource wants to rollback");
                    self.mark_rollback_only(
                        format!("prepare for {} wants to rollback", resource.name()),
                        Some(Box::new(e)),
                    );
                    return false;
                }
                Err(e) => {
                    error!(xid = %xid, resource = %resource.name(), error = %e, "unexpected error from resource manager");
                    self.mark_rollback_only(
                        format!(
                            "unexpected error in prepare for {}, rolling back",
                            resource.name()
                        ),
                        Some(Box::new(e)),
                    );
                    return false;
                }
            }
        }

        self.control.lock().transition(TransactionStatus::Prepared);
        true
    }

    /// Runs phase two, notifies after-completion and reports the result.
    fn completion_phase(&self, xid: &Xid) -> TxResult<()> {
        let commit = self.status() != TransactionStatus::MarkedRollback;
        trace!(xid = %xid, commit, "completion phase");

        let heuristic = self.finish_resources(xid, commit);
        let final_status = self.status();
        self.notify_after_completion(xid, final_status);

        heuristic?;

        let failure = self.control.lock().first_failure.take();
        match failure {
            Some(Failure { forced: true, .. }) => {
                trace!(xid = %xid, "forced rollback completed");
                Ok(())
            }
            Some(Failure {
                message, source, ..
            }) => Err(TxError::Rollback { message, source }),
            None => Ok(()),
        }
    }

    /// Commits or rolls back every enlisted resource that did not vote
    /// read-only, then clears the resource list.
    fn finish_resources(&self, xid: &Xid, commit: bool) -> TxResult<()> {
        let (in_progress, done) = if commit {
            (TransactionStatus::Committing, TransactionStatus::Committed)
        } else {
            (TransactionStatus::RollingBack, TransactionStatus::RolledBack)
        };
        self.control.lock().transition(in_progress);

        let entries = std::mem::take(&mut *self.resources.lock());
        let mut outcomes = Vec::with_capacity(entries.len());
        let mut unresolved = Vec::new();
        let mut last_error: Option<ResourceError> = None;

        for entry in &entries {
            let resource = &entry.resource;
            if entry.vote == Some(Vote::ReadOnly) {
                trace!(xid = %xid, resource = %resource.name(), "skipping read-only resource");
                continue;
            }
            let result = if commit {
                trace!(xid = %xid, resource = %resource.name(), "commit");
                resource.commit(xid, false)
            } else {
                trace!(xid = %xid, resource = %resource.name(), "rollback");
                resource.rollback(xid)
            };
            let outcome = Outcome::classify(&result);
            if let Err(e) = result {
                if outcome == Outcome::NotApplicable {
                    debug!(xid = %xid, resource = %resource.name(), "resource has no record of the transaction");
                } else {
                    error!(xid = %xid, resource = %resource.name(), error = %e, "error completing transaction");
                    unresolved.push(Arc::clone(resource));
                    last_error = Some(e);
                }
            }
            outcomes.push(outcome);
        }

        let result = aggregate(&outcomes);
        if result == Aggregate::Clean {
            self.control.lock().transition(done);
            return Ok(());
        }

        self.control.lock().transition(TransactionStatus::Unknown);
        error!(xid = %xid, outcome = ?result, "heuristic outcome, transaction is in doubt");
        if let Some(recovery) = &self.recovery {
            recovery.register(self.id, xid.clone(), unresolved);
        }
        Err(match result {
            Aggregate::HeuristicRollback => TxError::HeuristicRollback { source: last_error },
            _ => TxError::HeuristicMixed { source: last_error },
        })
    }

    fn notify_before_completion(&self, xid: &Xid) {
        // Index-based so callbacks registered during the sweep also run.
        let mut index = 0;
        loop {
            let Some(sync) = self.synchronizations.lock().get(index).cloned() else {
                break;
            };
            index += 1;
            trace!(xid = %xid, sync = %sync.name(), "before completion");
            if let Err(e) = sync.before_completion() {
                warn!(xid = %xid, sync = %sync.name(), error = %e, "before completion failed");
                self.mark_rollback_only(
                    format!("before completion for {} wants to rollback", sync.name()),
                    Some(e),
                );
            }
        }
    }

    fn notify_after_completion(&self, xid: &Xid, status: TransactionStatus) {
        let syncs = std::mem::take(&mut *self.synchronizations.lock());
        for sync in syncs {
            trace!(xid = %xid, sync = %sync.name(), %status, "after completion");
            if let Err(e) = sync.after_completion(status) {
                warn!(xid = %xid, sync = %sync.name(), error = %e, "after completion failed");
            }
        }
    }

    fn end_resources(&self, xid: &Xid) {
        for resource in self.enlisted_resources() {
            trace!(xid = %xid, resource = %resource.name(), "end");
            if let Err(e) = resource.end(xid, ResourceFlags::SUCCESS) {
                warn!(xid = %xid, resource = %resource.name(), error = %e, "resource end failed");
                let message = if e.kind().is_rollback() {
                    format!("end for {} wants to rollback", resource.name())
                } else {
                    format!(
                        "unexpected error in end for {}, marked as rollback",
                        resource.name()
                    )
                };
                self.mark_rollback_only(message, Some(Box::new(e)));
            }
        }
    }
}

fn check_status_before_register(status: TransactionStatus, component: &str) -> TxResult<()> {
    if status == TransactionStatus::MarkedRollback {
        return Err(TxError::rollback_only(
            "transaction has been marked as rollback only",
        ));
    }
    if status.is_done() {
        return Err(TxError::illegal_state(format!(
            "transaction is done, cannot register any more {component}"
        )));
    }
    Ok(())
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctl = self.control.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("xid", &ctl.xid)
            .field("status", &ctl.status)
            .finish_non_exhaustive()
    }
}
