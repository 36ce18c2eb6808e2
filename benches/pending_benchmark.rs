/*!
 * Pending-Event Store Benchmarks
 *
 * Record/consume cost and wake latency of the shared counter store
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sigmux::signals::pending::PendingEvents;
use sigmux::signals::{Signal, SlotTable};
use std::sync::Arc;
use std::thread;

fn bench_record_take(c: &mut Criterion) {
    let table = SlotTable::standard();
    let store = PendingEvents::new();

    c.bench_function("record_then_try_take", |b| {
        b.iter(|| {
            store.record(black_box(Signal::SIGTERM));
            black_box(store.try_take(&table).ok());
        });
    });
}

fn bench_drain_backlog(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_backlog");
    let table = SlotTable::standard();
    let signals: Vec<Signal> = table.iter().map(|(_, s)| s).collect();

    for backlog in [8usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(backlog), &backlog, |b, &backlog| {
            let store = PendingEvents::new();
            b.iter(|| {
                for i in 0..backlog {
                    store.record(signals[i % signals.len()]);
                }
                while let Ok(Some(slot)) = store.try_take(&table) {
                    black_box(slot);
                }
            });
        });
    }

    group.finish();
}

fn bench_wake_latency(c: &mut Criterion) {
    let table = Arc::new(SlotTable::standard());

    c.bench_function("blocked_take_wake", |b| {
        b.iter(|| {
            let store = Arc::new(PendingEvents::new());
            let waiter = {
                let store = store.clone();
                let table = table.clone();
                thread::spawn(move || store.take(&table))
            };
            store.record(Signal::SIGUSR1);
            black_box(waiter.join().ok());
        });
    });
}

criterion_group!(benches, bench_record_take, bench_drain_backlog, bench_wake_latency);
criterion_main!(benches);
