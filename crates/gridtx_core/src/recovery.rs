//! In-doubt transaction registry.
//!
//! When phase two ends with a heuristic or unexpected participant outcome the
//! transaction status becomes `Unknown` and the participants that did not
//! resolve cleanly are handed to a [`RecoveryRegistry`]. An operator (or the
//! cluster recovery subsystem) can then list them and force an outcome by
//! [`Xid`] or by internal [`TransactionId`].
//!
//! Resolution operations are idempotent: once a transaction is resolved or
//! forgotten, further calls report [`TxError::TransactionNotFound`].

use crate::error::{TxError, TxResult};
use crate::resource::ResourceRef;
use crate::transaction::Outcome;
use crate::types::TransactionId;
use crate::xid::Xid;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Descriptive view of an in-doubt transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InDoubtTransaction {
    /// Internal handle.
    pub id: TransactionId,
    /// Global identifier.
    pub xid: Xid,
    /// Names of the participants still awaiting resolution.
    pub participants: Vec<String>,
}

struct Record {
    xid: Xid,
    participants: Vec<ResourceRef>,
}

impl Record {
    fn describe(&self, id: TransactionId) -> InDoubtTransaction {
        InDoubtTransaction {
            id,
            xid: self.xid.clone(),
            participants: self.participants.iter().map(|p| p.name()).collect(),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_id: BTreeMap<TransactionId, Record>,
    by_xid: HashMap<Xid, TransactionId>,
}

impl Entries {
    fn remove(&mut self, id: TransactionId) -> Option<Record> {
        let record = self.by_id.remove(&id)?;
        self.by_xid.remove(&record.xid);
        Some(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Commit,
    Rollback,
}

/// Registry of transactions whose outcome needs out-of-band resolution.
pub struct RecoveryRegistry {
    entries: Mutex<Entries>,
    max_entries: usize,
}

impl RecoveryRegistry {
    /// Creates a registry retaining at most `max_entries` transactions
    /// (0 = unbounded).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_entries,
        }
    }

    /// Retains `participants` of transaction `id` for later resolution.
    ///
    /// Registering an identifier twice replaces the earlier record.
    pub fn register(&self, id: TransactionId, xid: Xid, participants: Vec<ResourceRef>) {
        let mut entries = self.entries.lock();
        if let Some(previous) = entries.by_xid.get(&xid).copied() {
            entries.remove(previous);
        }
        if self.max_entries > 0 && entries.by_id.len() >= self.max_entries {
            if let Some(oldest) = entries.by_id.keys().next().copied() {
                if let Some(evicted) = entries.remove(oldest) {
                    warn!(id = %oldest, xid = %evicted.xid, "in-doubt registry full, evicting oldest entry");
                }
            }
        }
        info!(id = %id, xid = %xid, participants = participants.len(), "transaction is in doubt");
        entries.by_xid.insert(xid.clone(), id);
        entries.by_id.insert(id, Record { xid, participants });
    }

    /// Lists in-doubt transactions ordered by internal id.
    pub fn in_doubt(&self) -> Vec<InDoubtTransaction> {
        let entries = self.entries.lock();
        entries
            .by_id
            .iter()
            .map(|(id, record)| record.describe(*id))
            .collect()
    }

    /// Looks up an in-doubt transaction by global identifier.
    pub fn find(&self, xid: &Xid) -> Option<InDoubtTransaction> {
        let entries = self.entries.lock();
        let id = *entries.by_xid.get(xid)?;
        entries.by_id.get(&id).map(|record| record.describe(id))
    }

    /// Returns the number of in-doubt transactions.
    pub fn len(&self) -> usize {
        self.entries.lock().by_id.len()
    }

    /// Returns true if nothing is in doubt.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commits every remaining participant of transaction `id`.
    ///
    /// # Errors
    ///
    /// [`TxError::TransactionNotFound`] if `id` is not in doubt;
    /// [`TxError::CoordinatorFailure`] if a participant still fails, in which
    /// case the transaction stays in doubt with the failing participants.
    pub fn force_commit(&self, id: TransactionId) -> TxResult<()> {
        let record = self.take(id)?;
        self.resolve(id, record, Resolution::Commit)
    }

    /// Commits every remaining participant of the transaction named by `xid`.
    ///
    /// # Errors
    ///
    /// See [`Self::force_commit`].
    pub fn force_commit_xid(&self, xid: &Xid) -> TxResult<()> {
        let id = self.id_of(xid)?;
        self.force_commit(id)
    }

    /// Rolls back every remaining participant of transaction `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::force_commit`].
    pub fn force_rollback(&self, id: TransactionId) -> TxResult<()> {
        let record = self.take(id)?;
        self.resolve(id, record, Resolution::Rollback)
    }

    /// Rolls back every remaining participant of the transaction named by `xid`.
    ///
    /// # Errors
    ///
    /// See [`Self::force_commit`].
    pub fn force_rollback_xid(&self, xid: &Xid) -> TxResult<()> {
        let id = self.id_of(xid)?;
        self.force_rollback(id)
    }

    /// Tells every remaining participant to forget transaction `id` and drops
    /// the record.
    ///
    /// # Errors
    ///
    /// [`TxError::TransactionNotFound`] if `id` is not in doubt.
    pub fn forget(&self, id: TransactionId) -> TxResult<()> {
        let record = self.take(id)?;
        forget_all(&record);
        info!(id = %id, xid = %record.xid, "in-doubt transaction forgotten");
        Ok(())
    }

    /// Forgets the transaction named by `xid`.
    ///
    /// # Errors
    ///
    /// See [`Self::forget`].
    pub fn forget_xid(&self, xid: &Xid) -> TxResult<()> {
        let id = self.id_of(xid)?;
        self.forget(id)
    }

    fn id_of(&self, xid: &Xid) -> TxResult<TransactionId> {
        self.entries
            .lock()
            .by_xid
            .get(xid)
            .copied()
            .ok_or_else(|| TxError::xid_not_found(xid))
    }

    fn take(&self, id: TransactionId) -> TxResult<Record> {
        self.entries
            .lock()
            .remove(id)
            .ok_or_else(|| TxError::id_not_found(id))
    }

    fn resolve(&self, id: TransactionId, record: Record, resolution: Resolution) -> TxResult<()> {
        let xid = &record.xid;
        let mut unresolved = Vec::new();
        let mut last_error = None;

        for participant in &record.participants {
            let result = match resolution {
                Resolution::Commit => participant.commit(xid, false),
                Resolution::Rollback => participant.rollback(xid),
            };
            let settled = match (Outcome::classify(&result), resolution) {
                (outcome, _) if outcome.is_resolved() => true,
                (Outcome::HeuristicCommit, Resolution::Commit) => true,
                (Outcome::HeuristicRollback, Resolution::Rollback) => true,
                _ => false,
            };
            if let Err(e) = result {
                if settled {
                    debug!(xid = %xid, resource = %participant.name(), error = %e, "participant already settled");
                } else {
                    error!(xid = %xid, resource = %participant.name(), error = %e, "forced resolution failed");
                    last_error = Some(e);
                    unresolved.push(participant.clone());
                    continue;
                }
            }
            if let Err(e) = participant.forget(xid) {
                debug!(xid = %xid, resource = %participant.name(), error = %e, "forget failed");
            }
        }

        match last_error {
            None => {
                info!(id = %id, xid = %xid, ?resolution, "in-doubt transaction resolved");
                Ok(())
            }
            Some(e) => {
                let remaining = unresolved.len();
                self.register(id, record.xid.clone(), unresolved);
                Err(TxError::coordinator_failure(
                    format!("{remaining} participant(s) of {id} remain in doubt"),
                    e,
                ))
            }
        }
    }
}

fn forget_all(record: &Record) {
    for participant in &record.participants {
        if let Err(e) = participant.forget(&record.xid) {
            debug!(xid = %record.xid, resource = %participant.name(), error = %e, "forget failed");
        }
    }
}

impl fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRegistry")
            .field("in_doubt", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        Resource, ResourceError, ResourceErrorKind, ResourceResult, Vote,
    };
    use crate::types::ResourceFlags;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Pending {
        calls: PlMutex<Vec<&'static str>>,
        fail_commit: PlMutex<Option<ResourceErrorKind>>,
    }

    impl Resource for Pending {
        fn start(&self, _: &Xid, _: ResourceFlags) -> ResourceResult<()> {
            Ok(())
        }
        fn end(&self, _: &Xid, _: ResourceFlags) -> ResourceResult<()> {
            Ok(())
        }
        fn prepare(&self, _: &Xid) -> ResourceResult<Vote> {
            Ok(Vote::Commit)
        }
        fn commit(&self, _: &Xid, _: bool) -> ResourceResult<()> {
            self.calls.lock().push("commit");
            match self.fail_commit.lock().take() {
                Some(kind) => Err(ResourceError::new(kind, "pending", "still failing")),
                None => Ok(()),
            }
        }
        fn rollback(&self, _: &Xid) -> ResourceResult<()> {
            self.calls.lock().push("rollback");
            Ok(())
        }
        fn forget(&self, _: &Xid) -> ResourceResult<()> {
            self.calls.lock().push("forget");
            Ok(())
        }
    }

    fn xid(n: u8) -> Xid {
        Xid::new(1, vec![n]).unwrap()
    }

    #[test]
    fn force_commit_is_idempotent() {
        let registry = RecoveryRegistry::new(0);
        let participant = Arc::new(Pending::default());
        registry.register(TransactionId::new(1), xid(1), vec![participant.clone() as ResourceRef]);

        registry.force_commit(TransactionId::new(1)).unwrap();
        assert_eq!(*participant.calls.lock(), vec!["commit", "forget"]);
        assert!(matches!(
            registry.force_commit(TransactionId::new(1)),
            Err(TxError::TransactionNotFound { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_by_xid() {
        let registry = RecoveryRegistry::new(0);
        registry.register(TransactionId::new(4), xid(4), Vec::new());

        let found = registry.find(&xid(4)).unwrap();
        assert_eq!(found.id, TransactionId::new(4));
        registry.force_rollback_xid(&xid(4)).unwrap();
        assert!(registry.find(&xid(4)).is_none());
        assert!(registry.forget_xid(&xid(4)).is_err());
    }

    #[test]
    fn failing_participant_stays_in_doubt() {
        let registry = RecoveryRegistry::new(0);
        let participant = Arc::new(Pending::default());
        *participant.fail_commit.lock() = Some(ResourceErrorKind::Unexpected);
        registry.register(TransactionId::new(2), xid(2), vec![participant.clone() as ResourceRef]);

        assert!(matches!(
            registry.force_commit(TransactionId::new(2)),
            Err(TxError::CoordinatorFailure { .. })
        ));
        assert_eq!(registry.len(), 1);

        registry.force_commit(TransactionId::new(2)).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn heuristic_in_requested_direction_settles() {
        let registry = RecoveryRegistry::new(0);
        let participant = Arc::new(Pending::default());
        *participant.fail_commit.lock() = Some(ResourceErrorKind::HeuristicCommit);
        registry.register(TransactionId::new(3), xid(3), vec![participant.clone() as ResourceRef]);

        registry.force_commit(TransactionId::new(3)).unwrap();
        assert_eq!(*participant.calls.lock(), vec!["commit", "forget"]);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let registry = RecoveryRegistry::new(2);
        for n in 1..=3u8 {
            registry.register(TransactionId::new(u64::from(n)), xid(n), Vec::new());
        }
        let ids: Vec<_> = registry.in_doubt().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TransactionId::new(2), TransactionId::new(3)]);
        assert!(registry.find(&xid(1)).is_none());
    }

    #[test]
    fn forget_calls_participants() {
        let registry = RecoveryRegistry::new(0);
        let participant = Arc::new(Pending::default());
        registry.register(TransactionId::new(9), xid(9), vec![participant.clone() as ResourceRef]);

        registry.forget(TransactionId::new(9)).unwrap();
        assert_eq!(*participant.calls.lock(), vec!["forget"]);
        assert!(registry.forget(TransactionId::new(9)).is_err());
    }
}
