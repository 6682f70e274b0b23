//! Benchmarks for the synchronous and asynchronous write paths.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use femtosink::SinkRegistry;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const ASYNC_BATCH: u64 = 256;
const RECORD: &str = "benchmark record with a modest amount of payload text";

fn bench_file_sink(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let registry = SinkRegistry::new();
    let handle = registry
        .register_file(dir.path().join("bench.log"))
        .expect("register file sink");

    c.bench_function("write_sync_file", |b| {
        b.iter(|| registry.write_sync(handle, black_box(RECORD)).expect("write"))
    });
    registry.close(handle).expect("close");
}

fn bench_rotating_sink(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let registry = SinkRegistry::new();
    let handle = registry
        .register_rotating(dir.path().join("bench"), 10_000)
        .expect("register rotating sink");

    c.bench_function("write_sync_rotating", |b| {
        b.iter(|| registry.write_sync(handle, black_box(RECORD)).expect("write"))
    });
    registry.close(handle).expect("close");
}

fn bench_async_dispatch(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let registry = SinkRegistry::new();
    let path = dir.path().join("async.log");

    // Each dispatch is a thread; drain every batch so they never pile up.
    c.bench_function("write_async_dispatch", |b| {
        b.iter_custom(|iters| {
            let mut elapsed = Duration::ZERO;
            let mut remaining = iters;
            while remaining > 0 {
                let batch = remaining.min(ASYNC_BATCH);
                let handle = registry.register_file(&path).expect("register file sink");
                let start = Instant::now();
                for _ in 0..batch {
                    registry
                        .write_async(handle, black_box(RECORD))
                        .expect("dispatch");
                }
                elapsed += start.elapsed();
                registry.close(handle).expect("close");
                remaining -= batch;
            }
            elapsed
        })
    });
}

criterion_group!(
    benches,
    bench_file_sink,
    bench_rotating_sink,
    bench_async_dispatch
);
criterion_main!(benches);
