//! Resilience Simulation
//!
//! Drives a flaky dependency through the full recovery stack:
//! - Circuit breaker from a named registry
//! - Retry with exponential backoff and seeded jitter
//! - Cached fallback when retries run out or the circuit is open
//!
//! By default time is virtual: backoff waits advance a manual clock instead of
//! sleeping, so a run covering minutes of traffic finishes instantly and the
//! same seed always produces the same output.

use anyhow::Result;
use bulwark_bins::common::{init_logging, log_config, CommonArgs};
use bulwark_core::core::{CircuitStats, ErrorCategory, Failure};
use bulwark_core::monitoring::{
    MetricsObserver, Notice, Notifier, ResilienceMetrics, TracingLogger,
};
use bulwark_core::resilience::{
    Clock, FallbackStrategy, ManualClock, SeededJitter, SharedClock, SharedSleeper, Sleeper,
    SystemClock, TokioSleeper, VirtualSleeper,
};
use bulwark_core::{CircuitBreakerRegistry, CompositeStrategy, RetryExecutor};
use clap::Parser;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEPENDENCY: &str = "inventory-api";

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate resilient calls against a flaky dependency")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value = "60")]
    requests: u64,

    /// Probability that a healthy dependency fails a call
    #[arg(long, default_value = "0.3", value_parser = parse_probability)]
    failure_rate: f64,

    /// First request of a full outage (every call fails)
    #[arg(long, default_value = "20")]
    outage_start: u64,

    /// Length of the outage in requests
    #[arg(long, default_value = "15")]
    outage_length: u64,

    /// Time between requests in milliseconds
    #[arg(long, default_value = "500")]
    interval_ms: u64,

    /// Seed for failures and jitter
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Sleep for real instead of advancing a virtual clock
    #[arg(long)]
    real_time: bool,
}

fn parse_probability(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not a probability in [0, 1]", raw))
    }
}

/// Requests `start..start + length`, clipped at the end of the range
fn outage_window(start: u64, length: u64) -> std::ops::Range<u64> {
    start..start.saturating_add(length)
}

/// Dependency that fails at random, and always during an outage window
struct FlakyDependency {
    rng: Mutex<StdRng>,
    failure_rate: f64,
    outage: std::ops::Range<u64>,
}

impl FlakyDependency {
    fn new(seed: u64, failure_rate: f64, outage: std::ops::Range<u64>) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            // NaN compares false, so it lands on the healthy side
            failure_rate: if failure_rate > 0.0 {
                failure_rate.min(1.0)
            } else {
                0.0
            },
            outage,
        }
    }

    fn call(&self, request: u64) -> anyhow::Result<u64> {
        if self.outage.contains(&request) {
            return Err(Failure::status(503, "inventory-api unavailable").into());
        }

        let mut rng = self.rng.lock();
        if !rng.gen_bool(self.failure_rate) {
            return Ok(rng.gen_range(0..500));
        }

        let failure = match rng.gen_range(0..4) {
            0 => Failure::transport("connection reset by peer"),
            1 => Failure::status(429, "too many requests"),
            2 => Failure::status(502, "bad gateway"),
            _ => Failure::categorized(ErrorCategory::Database, "replica lag").with_status(503),
        };
        Err(failure.into())
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy)]
enum Served {
    Live(u64),
    Cached,
}

/// Surfaces notices the way an application would show them to a user
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::TerminalFailure {
                operation,
                descriptor,
                attempts,
            } => tracing::warn!(
                "{} failed after {} attempt(s): {}",
                operation,
                attempts,
                descriptor
            ),
            Notice::CircuitOpen {
                breaker,
                retry_after,
            } => tracing::warn!("{} is unavailable, retry in {:?}", breaker, retry_after),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    requests: u64,
    live: u64,
    cached: u64,
    failed: u64,
    elapsed_ms: u128,
    breakers: BTreeMap<String, CircuitStats>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common.log_level, args.common.json_logs)?;

    tracing::info!("=== Bulwark: resilience simulation ===");
    let config = args.common.config()?;
    log_config(args.common.profile, &config);

    // Virtual time unless asked otherwise
    let manual = Arc::new(ManualClock::new());
    let clock: SharedClock = if args.real_time {
        SystemClock::shared()
    } else {
        manual.clone()
    };
    let sleeper: SharedSleeper = if args.real_time {
        TokioSleeper::shared()
    } else {
        Arc::new(VirtualSleeper::new(manual))
    };
    let started = clock.now();

    let metrics = ResilienceMetrics::new()?;
    let notifier = Arc::new(LogNotifier);

    let registry = CircuitBreakerRegistry::new(config.circuit_breaker.clone())?
        .with_clock(clock.clone())
        .with_observer(Arc::new(MetricsObserver::new(metrics.clone())))
        .with_notifier(notifier.clone());
    let retry = RetryExecutor::new(config.retry.clone())?
        .with_name(DEPENDENCY)
        .with_jitter(Arc::new(SeededJitter::new(args.seed)))
        .with_sleeper(sleeper.clone())
        .with_notifier(notifier);
    let recovery: CompositeStrategy<Served> = CompositeStrategy::new()
        .with_name("inventory-read")
        .with_logger(TracingLogger::shared())
        .with_strategy(retry)
        .with_strategy(FallbackStrategy::new("cache").then(|| async { Ok(Served::Cached) }));

    let dependency = Arc::new(FlakyDependency::new(
        args.seed,
        args.failure_rate,
        outage_window(args.outage_start, args.outage_length),
    ));
    let breaker = registry.get_or_create(DEPENDENCY);
    let mut summary = Summary {
        requests: args.requests,
        ..Default::default()
    };

    for request in 0..args.requests {
        let operation = || {
            let breaker = breaker.clone();
            let dependency = Arc::clone(&dependency);
            async move {
                let value = breaker
                    .execute(|| async { dependency.call(request) })
                    .await?;
                Ok::<_, anyhow::Error>(Served::Live(value))
            }
        };

        match recovery.execute(operation).await {
            Ok(Served::Live(stock)) => {
                tracing::debug!("request {}: live stock {}", request, stock);
                summary.live += 1;
            }
            Ok(Served::Cached) => {
                tracing::info!("request {}: served from cache", request);
                summary.cached += 1;
            }
            Err(error) => {
                tracing::error!("request {}: {}", request, error);
                summary.failed += 1;
            }
        }

        sleeper.sleep(Duration::from_millis(args.interval_ms)).await;
    }

    summary.elapsed_ms = clock.now().duration_since(started).as_millis();
    summary.breakers = registry.snapshot();

    tracing::info!("=== Final Statistics ===");
    tracing::info!(
        "Live: {}, cached: {}, failed: {}",
        summary.live,
        summary.cached,
        summary.failed
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.common.metrics {
        print!("{}", metrics.encode()?);
    }

    Ok(())
}
