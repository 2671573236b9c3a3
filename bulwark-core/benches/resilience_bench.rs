// Resilience Benchmarks
//
// Per-call overhead of the pieces every resilient call goes through:
// - Classifying a failure
// - Computing a jittered backoff delay
// - The retry executor's success path (no waiting)

use bulwark_core::core::Failure;
use bulwark_core::resilience::{base_delay, jittered_delay, FixedJitter};
use bulwark_core::testing::RecordingSleeper;
use bulwark_core::{classify, RetryExecutor, RetryPolicy};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::io;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CLASSIFICATION BENCHMARKS
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.measurement_time(Duration::from_secs(2));

    group.bench_function("status_503", |b| {
        b.iter(|| classify(black_box(Failure::status(503, "service unavailable").into())))
    });

    group.bench_function("io_connection_reset", |b| {
        b.iter(|| {
            classify(black_box(
                io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer").into(),
            ))
        })
    });

    // Falls through every rule, including the message scan
    group.bench_function("unlabelled_message", |b| {
        b.iter(|| classify(black_box(anyhow::anyhow!("unexpected token in response body"))))
    });

    group.finish();
}

// ============================================================================
// BACKOFF BENCHMARKS
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff");
    group.measurement_time(Duration::from_secs(2));

    let policy = RetryPolicy::default();
    for attempt in [1u32, 5, 20] {
        group.bench_with_input(BenchmarkId::new("base_delay", attempt), &attempt, |b, &n| {
            b.iter(|| base_delay(black_box(&policy), black_box(n)))
        });
        group.bench_with_input(
            BenchmarkId::new("jittered_delay", attempt),
            &attempt,
            |b, &n| b.iter(|| jittered_delay(black_box(&policy), black_box(n), black_box(0.37))),
        );
    }

    group.finish();
}

// ============================================================================
// RETRY EXECUTOR BENCHMARKS
// ============================================================================

fn bench_retry_executor(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_executor");
    group.measurement_time(Duration::from_secs(3));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let executor = RetryExecutor::new(RetryPolicy::aggressive())
        .unwrap()
        .with_jitter(Arc::new(FixedJitter(0.0)))
        .with_sleeper(Arc::new(RecordingSleeper::new()));

    group.bench_function("first_attempt_succeeds", |b| {
        b.iter(|| {
            runtime.block_on(executor.execute_with_retry(|| async {
                Ok::<_, anyhow::Error>(black_box(42))
            }))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_backoff, bench_retry_executor);
criterion_main!(benches);
