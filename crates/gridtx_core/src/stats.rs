//! Coordinator statistics.
//!
//! Counters are updated by the [`TransactionManager`](crate::TransactionManager)
//! for transactions it begins and completes.
//!
//! # Usage
//!
//! ```rust,ignore
//! let tm = TransactionManager::new(CoordinatorConfig::default());
//! // ... run transactions ...
//! let snap = tm.stats().snapshot();
//! println!("committed: {}", snap.committed);
//! ```

use crate::status::TransactionStatus;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction outcome counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    /// Transactions started.
    begun: AtomicU64,
    /// Transactions committed.
    committed: AtomicU64,
    /// Transactions rolled back.
    rolled_back: AtomicU64,
    /// Transactions that ended with a heuristic outcome.
    heuristic: AtomicU64,
    /// Transactions suspended.
    suspended: AtomicU64,
    /// Transactions resumed.
    resumed: AtomicU64,
}

impl CoordinatorStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suspend(&self) {
        self.suspended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resume(&self) {
        self.resumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the final status of a completed transaction.
    pub(crate) fn record_completion(&self, status: TransactionStatus) {
        let counter = match status {
            TransactionStatus::Committed => &self.committed,
            TransactionStatus::RolledBack => &self.rolled_back,
            TransactionStatus::Unknown => &self.heuristic,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of transactions started.
    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions committed.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions rolled back.
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Returns the number of heuristic outcomes.
    pub fn heuristic(&self) -> u64 {
        self.heuristic.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            begun: self.begun(),
            committed: self.committed(),
            rolled_back: self.rolled_back(),
            heuristic: self.heuristic(),
            suspended: self.suspended.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`CoordinatorStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub begun: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions rolled back.
    pub rolled_back: u64,
    /// Transactions that ended with a heuristic outcome.
    pub heuristic: u64,
    /// Transactions suspended.
    pub suspended: u64,
    /// Transactions resumed.
    pub resumed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = CoordinatorStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn completion_counts_by_status() {
        let stats = CoordinatorStats::new();
        stats.record_begin();
        stats.record_begin();
        stats.record_completion(TransactionStatus::Committed);
        stats.record_completion(TransactionStatus::Unknown);
        stats.record_completion(TransactionStatus::Active);

        let snap = stats.snapshot();
        assert_eq!(snap.begun, 2);
        assert_eq!(snap.committed, 1);
        assert_eq!(snap.heuristic, 1);
        assert_eq!(snap.rolled_back, 0);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(CoordinatorStats::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_begin();
                    s.record_completion(TransactionStatus::RolledBack);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.begun(), 800);
        assert_eq!(stats.rolled_back(), 800);
    }
}
