//! Scripted participants and call recording.
//!
//! [`MockResource`] and [`RecordingSynchronization`] append every call they
//! receive to a shared [`CallLog`], so tests can assert on the exact order in
//! which the coordinator drove them.

use gridtx_core::{
    BoxError, Resource, ResourceError, ResourceErrorKind, ResourceFlags, ResourceResult,
    Synchronization, TransactionStatus, Vote, Xid,
};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An operation observed on a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `Resource::start`
    Start,
    /// `Resource::end`
    End,
    /// `Resource::prepare`
    Prepare,
    /// `Resource::commit`
    Commit,
    /// `Resource::rollback`
    Rollback,
    /// `Resource::forget`
    Forget,
    /// `Synchronization::before_completion`
    BeforeCompletion,
    /// `Synchronization::after_completion` with the reported status.
    AfterCompletion(TransactionStatus),
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Name of the participant.
    pub participant: String,
    /// What was called.
    pub operation: Operation,
}

/// Shared, ordered record of participant calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn record(&self, participant: &str, operation: Operation) {
        self.calls.lock().push(Call {
            participant: participant.to_string(),
            operation,
        });
    }

    /// Returns all calls in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns, in call order, the participants that received `operation`.
    pub fn participants_for(&self, operation: Operation) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.participant.clone())
            .collect()
    }

    /// Returns the operations received by `participant`, in order.
    pub fn operations(&self, participant: &str) -> Vec<Operation> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.participant == participant)
            .map(|c| c.operation)
            .collect()
    }

    /// Counts how often `participant` received `operation`.
    pub fn count(&self, participant: &str, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.participant == participant && c.operation == operation)
            .count()
    }

    /// Returns the number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Scripted answers of a [`MockResource`].
#[derive(Debug, Clone)]
pub struct Script {
    /// Failure of `start`.
    pub start: Option<ResourceErrorKind>,
    /// Failure of `end`.
    pub end: Option<ResourceErrorKind>,
    /// Vote or failure of `prepare`.
    pub prepare: Result<Vote, ResourceErrorKind>,
    /// Failure of `commit`.
    pub commit: Option<ResourceErrorKind>,
    /// Failure of `rollback`.
    pub rollback: Option<ResourceErrorKind>,
    /// Whether `is_same_resource_manager` fails.
    pub comparison_fails: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            prepare: Ok(Vote::Commit),
            commit: None,
            rollback: None,
            comparison_fails: false,
        }
    }
}

/// A resource whose answers are scripted and whose calls are logged.
pub struct MockResource {
    name: String,
    resource_manager: Option<String>,
    log: CallLog,
    script: Mutex<Script>,
    last_xid: Mutex<Option<Xid>>,
}

impl MockResource {
    /// Creates a resource that accepts every call and votes to commit.
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            resource_manager: None,
            log: log.clone(),
            script: Mutex::new(Script::default()),
            last_xid: Mutex::new(None),
        }
    }

    /// Sets the resource manager identity used for de-duplication.
    #[must_use]
    pub fn with_resource_manager(mut self, rm: impl Into<String>) -> Self {
        self.resource_manager = Some(rm.into());
        self
    }

    /// Makes `start` fail with `kind`.
    #[must_use]
    pub fn fail_start(self, kind: ResourceErrorKind) -> Self {
        self.script.lock().start = Some(kind);
        self
    }

    /// Makes `end` fail with `kind`.
    #[must_use]
    pub fn fail_end(self, kind: ResourceErrorKind) -> Self {
        self.script.lock().end = Some(kind);
        self
    }

    /// Makes `prepare` answer with `vote`.
    #[must_use]
    pub fn vote(self, vote: Vote) -> Self {
        self.script.lock().prepare = Ok(vote);
        self
    }

    /// Makes `prepare` fail with `kind`.
    #[must_use]
    pub fn fail_prepare(self, kind: ResourceErrorKind) -> Self {
        self.script.lock().prepare = Err(kind);
        self
    }

    /// Makes `commit` fail with `kind`.
    #[must_use]
    pub fn fail_commit(self, kind: ResourceErrorKind) -> Self {
        self.script.lock().commit = Some(kind);
        self
    }

    /// Makes `rollback` fail with `kind`.
    #[must_use]
    pub fn fail_rollback(self, kind: ResourceErrorKind) -> Self {
        self.script.lock().rollback = Some(kind);
        self
    }

    /// Makes `is_same_resource_manager` fail.
    #[must_use]
    pub fn fail_comparison(self) -> Self {
        self.script.lock().comparison_fails = true;
        self
    }

    /// Wraps the resource for sharing with a transaction.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Replaces the script, e.g. to let a recovered participant succeed.
    pub fn rescript(&self, script: Script) {
        *self.script.lock() = script;
    }

    /// Returns the identifier passed to the most recent call.
    pub fn last_xid(&self) -> Option<Xid> {
        self.last_xid.lock().clone()
    }

    fn observe(&self, xid: &Xid, operation: Operation) {
        *self.last_xid.lock() = Some(xid.clone());
        self.log.record(&self.name, operation);
    }

    fn answer(&self, kind: Option<ResourceErrorKind>) -> ResourceResult<()> {
        match kind {
            Some(kind) => Err(self.error(kind)),
            None => Ok(()),
        }
    }

    fn error(&self, kind: ResourceErrorKind) -> ResourceError {
        ResourceError::new(kind, self.name.clone(), format!("scripted {kind}"))
    }
}

impl Resource for MockResource {
    fn start(&self, xid: &Xid, _flags: ResourceFlags) -> ResourceResult<()> {
        self.observe(xid, Operation::Start);
        let kind = self.script.lock().start;
        self.answer(kind)
    }

    fn end(&self, xid: &Xid, _flags: ResourceFlags) -> ResourceResult<()> {
        self.observe(xid, Operation::End);
        let kind = self.script.lock().end;
        self.answer(kind)
    }

    fn prepare(&self, xid: &Xid) -> ResourceResult<Vote> {
        self.observe(xid, Operation::Prepare);
        let answer = self.script.lock().prepare;
        answer.map_err(|kind| self.error(kind))
    }

    fn commit(&self, xid: &Xid, _one_phase: bool) -> ResourceResult<()> {
        self.observe(xid, Operation::Commit);
        let kind = self.script.lock().commit;
        self.answer(kind)
    }

    fn rollback(&self, xid: &Xid) -> ResourceResult<()> {
        self.observe(xid, Operation::Rollback);
        let kind = self.script.lock().rollback;
        self.answer(kind)
    }

    fn forget(&self, xid: &Xid) -> ResourceResult<()> {
        self.observe(xid, Operation::Forget);
        Ok(())
    }

    fn resource_manager(&self) -> Option<&str> {
        self.resource_manager.as_deref()
    }

    fn is_same_resource_manager(&self, other: &dyn Resource) -> ResourceResult<bool> {
        if self.script.lock().comparison_fails {
            return Err(self.error(ResourceErrorKind::Unexpected));
        }
        Ok(match (self.resource_manager(), other.resource_manager()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// A synchronization that logs its callbacks.
pub struct RecordingSynchronization {
    name: String,
    log: CallLog,
    fail_before: bool,
    fail_after: bool,
}

impl RecordingSynchronization {
    /// Creates a synchronization whose callbacks succeed.
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            fail_before: false,
            fail_after: false,
        }
    }

    /// Makes `before_completion` fail.
    #[must_use]
    pub fn fail_before(mut self) -> Self {
        self.fail_before = true;
        self
    }

    /// Makes `after_completion` fail.
    #[must_use]
    pub fn fail_after(mut self) -> Self {
        self.fail_after = true;
        self
    }

    /// Wraps the synchronization for sharing with a transaction.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Synchronization for RecordingSynchronization {
    fn before_completion(&self) -> Result<(), BoxError> {
        self.log.record(&self.name, Operation::BeforeCompletion);
        if self.fail_before {
            return Err(format!("{} vetoed the commit", self.name).into());
        }
        Ok(())
    }

    fn after_completion(&self, status: TransactionStatus) -> Result<(), BoxError> {
        self.log.record(&self.name, Operation::AfterCompletion(status));
        if self.fail_after {
            return Err(format!("{} failed after completion", self.name).into());
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_calls_in_order() {
        let log = CallLog::new();
        let xid = Xid::new(1, b"x".to_vec()).unwrap();
        let mock = MockResource::new("a", &log).vote(Vote::ReadOnly);

        mock.start(&xid, ResourceFlags::NO_FLAGS).unwrap();
        assert_eq!(mock.prepare(&xid).unwrap(), Vote::ReadOnly);

        assert_eq!(log.operations("a"), vec![Operation::Start, Operation::Prepare]);
        assert_eq!(mock.last_xid(), Some(xid));
    }

    #[test]
    fn scripted_failures() {
        let log = CallLog::new();
        let xid = Xid::new(1, b"x".to_vec()).unwrap();
        let mock = MockResource::new("a", &log)
            .fail_commit(ResourceErrorKind::HeuristicCommit)
            .fail_prepare(ResourceErrorKind::Rollback(101));

        assert_eq!(
            mock.prepare(&xid).unwrap_err().kind(),
            ResourceErrorKind::Rollback(101)
        );
        assert_eq!(
            mock.commit(&xid, false).unwrap_err().kind(),
            ResourceErrorKind::HeuristicCommit
        );

        mock.rescript(Script::default());
        assert!(mock.commit(&xid, false).is_ok());
        assert_eq!(log.count("a", Operation::Commit), 2);
    }

    #[test]
    fn comparison_by_resource_manager() {
        let log = CallLog::new();
        let a = MockResource::new("a", &log).with_resource_manager("rm");
        let b = MockResource::new("b", &log).with_resource_manager("rm");
        let c = MockResource::new("c", &log).fail_comparison();

        assert!(a.is_same_resource_manager(&b).unwrap());
        assert!(c.is_same_resource_manager(&a).is_err());
    }

    #[test]
    fn synchronization_logs_status() {
        let log = CallLog::new();
        let sync = RecordingSynchronization::new("s", &log).fail_after();

        sync.before_completion().unwrap();
        assert!(sync.after_completion(TransactionStatus::RolledBack).is_err());
        assert_eq!(
            log.operations("s"),
            vec![
                Operation::BeforeCompletion,
                Operation::AfterCompletion(TransactionStatus::RolledBack)
            ]
        );
    }
}
