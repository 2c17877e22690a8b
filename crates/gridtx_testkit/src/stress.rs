//! Stress runs for the coordinator.
//!
//! These drive many short transactions, sequentially and from several
//! threads, and count how many completed the way they were expected to.
//! Every transaction is driven by the thread that began it; concurrent
//! threads only ever share the manager.

use crate::fixtures::{CallLog, MockResource};
use gridtx_core::{
    ResourceErrorKind, TransactionContext, TransactionManager, TransactionStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations that ended as expected.
    pub successful_ops: usize,
    /// Operations that did not.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Resources enlisted per transaction.
    pub participants: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            participants: 3,
        }
    }
}

/// Begins a transaction, enlists `participants` resources and commits it.
fn commit_one(tm: &TransactionManager, participants: usize, fail_prepare: bool) -> bool {
    let log = CallLog::new();
    let mut ctx = TransactionContext::new();
    let txn = match tm.begin(&mut ctx) {
        Ok(txn) => txn,
        Err(_) => return false,
    };

    for p in 0..participants {
        let mut resource = MockResource::new(format!("r{p}"), &log);
        if fail_prepare && p + 1 == participants {
            resource = resource.fail_prepare(ResourceErrorKind::Rollback(100));
        }
        if txn.enlist_resource(resource.shared()).is_err() {
            return false;
        }
    }

    let committed = tm.commit(&mut ctx).is_ok();
    match (fail_prepare, committed) {
        (false, true) => txn.status() == TransactionStatus::Committed,
        (true, false) => txn.status() == TransactionStatus::RolledBack,
        _ => false,
    }
}

/// Runs transactions one after another, all expected to commit.
pub fn stress_sequential_commits(tm: &TransactionManager, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations {
        if commit_one(tm, config.participants, false) {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs transactions where every other one has a participant veto the
/// prepare; vetoed ones must roll back, the rest must commit.
pub fn stress_vetoed_commits(tm: &TransactionManager, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let veto = i % 2 == 0 && config.participants > 0;
        if commit_one(tm, config.participants, veto) {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs transactions from several threads against one manager, each thread
/// with its own context.
pub fn stress_concurrent_commits(
    tm: Arc<TransactionManager>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let tm = Arc::clone(&tm);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let participants = config.participants;

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    if commit_one(&tm, participants, false) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(ops_per_thread, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            operations: 200,
            threads: 4,
            participants: 3,
        }
    }

    #[test]
    fn test_sequential_commits() {
        let tm = TransactionManager::default();
        let result = stress_sequential_commits(&tm, &small());

        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
        assert_eq!(tm.stats().committed(), 200);
    }

    #[test]
    fn test_vetoed_commits() {
        let tm = TransactionManager::default();
        let result = stress_vetoed_commits(&tm, &small());

        assert_eq!(result.failed_ops, 0);
        assert_eq!(tm.stats().committed(), 100);
        assert_eq!(tm.stats().rolled_back(), 100);
    }

    #[test]
    fn test_concurrent_commits() {
        let tm = Arc::new(TransactionManager::default());
        let result = stress_concurrent_commits(Arc::clone(&tm), &small());

        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
        assert_eq!(tm.stats().begun(), 200);
    }
}
