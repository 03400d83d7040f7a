//! Dispatch benchmark suite for Crossexec.
//!
//! Benchmarks the cost of each call path:
//! - Same-context synchronous calls (no queue interaction)
//! - Direct-lock synchronous calls from the default thread into a worker
//! - Asynchronous round trips through a worker and back
//! - Raw queue push/drain on a manually driven context
//!
//! Run:
//!   cargo bench --bench dispatch_benchmark

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use crossexec::test_utils::{test_default_driver, test_manual_driver, test_worker};
use crossexec::{FnUnit, ScheduleOptions, Scope, run_async, run_sync, task_fn};

// =============================================================================
// SYNCHRONOUS DISPATCH
// =============================================================================

fn bench_sync_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/sync");
    let driver = test_default_driver("bench-sync");
    let own = driver.handle();
    let worker = test_worker("bench-sync-worker");

    group.bench_function("same_context", |b| {
        b.iter(|| {
            let value = driver
                .enter(|scope| run_sync(scope, &own, FnUnit::new(|_: &Scope| Ok(black_box(42u64)))))
                .and_then(|inner| inner);
            black_box(value)
        })
    });

    group.bench_function("default_thread_into_worker", |b| {
        b.iter(|| {
            let value = driver
                .enter(|scope| {
                    run_sync(scope, &worker, FnUnit::new(|_: &Scope| Ok(black_box(42u64))))
                })
                .and_then(|inner| inner);
            black_box(value)
        })
    });

    group.finish();
    let _ = worker.dispose();
}

// =============================================================================
// ASYNCHRONOUS ROUND TRIPS
// =============================================================================

fn bench_async_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/async");
    let driver = test_default_driver("bench-async");
    let worker = test_worker("bench-async-worker");

    for &calls in &[1usize, 16, 128] {
        group.throughput(Throughput::Elements(calls as u64));
        group.bench_with_input(BenchmarkId::new("worker_round_trip", calls), &calls, |b, &calls| {
            b.iter(|| {
                let pendings: Vec<_> = (0..calls)
                    .filter_map(|i| {
                        driver
                            .enter(|scope| {
                                run_async(scope, &worker, FnUnit::new(move |_: &Scope| Ok(i)))
                            })
                            .and_then(|inner| inner)
                            .ok()
                    })
                    .collect();
                let _ = driver.run_until(|| pendings.iter().all(crossexec::Pending::is_settled));
                black_box(pendings.len())
            })
        });
    }

    group.finish();
    let _ = worker.dispose();
}

// =============================================================================
// QUEUE THROUGHPUT
// =============================================================================

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/queue");

    for &tasks in &[64usize, 1024] {
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::new("push_then_drain", tasks), &tasks, |b, &tasks| {
            b.iter_batched(
                || test_manual_driver("bench-queue"),
                |driver| {
                    let handle = driver.handle();
                    for _ in 0..tasks {
                        handle.schedule(task_fn(|_| {}), ScheduleOptions::default().wake(false));
                    }
                    black_box(driver.run_pending())
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sync_dispatch,
    bench_async_round_trip,
    bench_queue_drain
);
criterion_main!(benches);
