//! Benchmark utilities.

use gridtx_core::{
    Resource, ResourceFlags, ResourceResult, Transaction, TxResult, Vote, Xid,
};
use rand::Rng;
use std::sync::Arc;

/// A resource that accepts every call without doing any work.
#[derive(Debug, Clone, Copy)]
pub struct NoopResource {
    vote: Vote,
}

impl NoopResource {
    /// Creates a resource that votes `vote` on prepare.
    pub fn new(vote: Vote) -> Self {
        Self { vote }
    }
}

impl Resource for NoopResource {
    fn start(&self, _xid: &Xid, _flags: ResourceFlags) -> ResourceResult<()> {
        Ok(())
    }

    fn end(&self, _xid: &Xid, _flags: ResourceFlags) -> ResourceResult<()> {
        Ok(())
    }

    fn prepare(&self, _xid: &Xid) -> ResourceResult<Vote> {
        Ok(self.vote)
    }

    fn commit(&self, _xid: &Xid, _one_phase: bool) -> ResourceResult<()> {
        Ok(())
    }

    fn rollback(&self, _xid: &Xid) -> ResourceResult<()> {
        Ok(())
    }

    fn forget(&self, _xid: &Xid) -> ResourceResult<()> {
        Ok(())
    }
}

/// Enlists `count` no-op resources voting `vote`.
pub fn enlist_noop(txn: &Transaction, count: usize, vote: Vote) -> TxResult<()> {
    for _ in 0..count {
        txn.enlist_resource(Arc::new(NoopResource::new(vote)))?;
    }
    Ok(())
}

/// Generate random global transaction id bytes of the specified size.
pub fn random_gtrid(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of identifiers with random payloads.
pub fn generate_xids(count: usize, size: usize) -> TxResult<Vec<Xid>> {
    (0..count)
        .map(|_| Xid::new(gridtx_core::DEFAULT_FORMAT_ID, random_gtrid(size)))
        .collect()
}
