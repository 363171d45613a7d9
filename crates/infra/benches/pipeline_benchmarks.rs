use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Mutex;
use std::time::Duration;

use paylake_core::PaymentEnvelope;
use paylake_infra::{Consumer, InMemoryObjectStore, KeyScheme, WorkerConfig, WorkerStats};
use paylake_queue::{InMemoryQueue, PaymentQueue};

fn body(n: usize) -> String {
    format!(
        r#"{{"payment_id":"p-{n:08}","amount":125.50,"ts":"2026-01-15T10:30:00Z"}}"#
    )
}

fn drain_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_name("bench-worker")
        .with_wait_time(Duration::ZERO)
}

fn bench_envelope_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_decode");
    group.sample_size(1000);

    let valid = body(42);
    group.bench_function("valid_payment", |b| {
        b.iter(|| PaymentEnvelope::parse(black_box(valid.as_bytes())).unwrap());
    });

    let malformed = r#"{"payment_id":"p-1","amount":"not a number"}"#;
    group.bench_function("malformed_payment", |b| {
        b.iter(|| PaymentEnvelope::parse(black_box(malformed.as_bytes())).unwrap_err());
    });

    group.finish();
}

fn bench_enqueue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_enqueue", batch_size),
            batch_size,
            |b, &size| {
                let queue = InMemoryQueue::new();
                b.iter(|| {
                    for n in 0..size {
                        queue.enqueue(black_box(body(n))).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_lease_ack_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lease_ack_cycle");
    group.sample_size(1000);

    // Enqueue, lease, and acknowledge one message per iteration so queue
    // depth stays constant across the run.
    group.bench_function("single_message", |b| {
        let queue = InMemoryQueue::new();
        b.iter(|| {
            queue.enqueue(black_box(body(0))).unwrap();
            let leased = queue.lease(1, Duration::ZERO).unwrap();
            queue.acknowledge(&leased[0].handle).unwrap();
        });
    });

    group.finish();
}

fn bench_pipeline_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_drain");

    for message_count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*message_count as u64));
        group.bench_with_input(
            BenchmarkId::new("enqueue_and_consume", message_count),
            message_count,
            |b, &count| {
                let config = drain_config();
                b.iter(|| {
                    let queue = InMemoryQueue::arc();
                    let store = InMemoryObjectStore::arc();
                    for n in 0..count {
                        queue.enqueue(body(n)).unwrap();
                    }

                    let consumer =
                        Consumer::new(queue.clone(), store.clone(), KeyScheme::default());
                    let stats = Mutex::new(WorkerStats::default());
                    while consumer.poll_once(&config, &stats).unwrap() > 0 {}

                    assert_eq!(black_box(store.len()), count);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_decode,
    bench_enqueue_throughput,
    bench_lease_ack_cycle,
    bench_pipeline_drain
);
criterion_main!(benches);
