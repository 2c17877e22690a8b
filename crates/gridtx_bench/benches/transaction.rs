//! Transaction protocol benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gridtx_bench::enlist_noop;
use gridtx_core::{TransactionContext, TransactionManager, Vote};

/// Benchmark two-phase commit with a growing number of participants.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for participants in [0usize, 1, 4, 16, 64].iter() {
        group.throughput(Throughput::Elements(*participants as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(participants),
            participants,
            |b, &participants| {
                let tm = TransactionManager::default();
                b.iter(|| {
                    let mut ctx = TransactionContext::new();
                    let txn = tm.begin(&mut ctx).unwrap();
                    enlist_noop(&txn, participants, Vote::Commit).unwrap();
                    tm.commit(black_box(&mut ctx)).unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark commit where every participant votes read-only.
fn bench_read_only_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_only_commit");

    for participants in [1usize, 16, 64].iter() {
        group.throughput(Throughput::Elements(*participants as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(participants),
            participants,
            |b, &participants| {
                let tm = TransactionManager::default();
                b.iter(|| {
                    let mut ctx = TransactionContext::new();
                    let txn = tm.begin(&mut ctx).unwrap();
                    enlist_noop(&txn, participants, Vote::ReadOnly).unwrap();
                    tm.commit(black_box(&mut ctx)).unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark explicit rollback.
fn bench_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollback");

    for participants in [1usize, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(participants),
            participants,
            |b, &participants| {
                let tm = TransactionManager::default();
                b.iter(|| {
                    let mut ctx = TransactionContext::new();
                    let txn = tm.begin(&mut ctx).unwrap();
                    enlist_noop(&txn, participants, Vote::Commit).unwrap();
                    tm.rollback(black_box(&mut ctx)).unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_commit, bench_read_only_commit, bench_rollback);
criterion_main!(benches);
