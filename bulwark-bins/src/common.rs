//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::Result;
use bulwark_core::{ConfigProfile, ProfileName, ResilienceConfig};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Configuration profile (development, staging, production)
    #[arg(short, long, default_value = "development")]
    pub profile: ProfileName,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    pub metrics: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CommonArgs {
    /// Validated configuration for the selected profile
    pub fn config(&self) -> Result<ResilienceConfig> {
        let config = ConfigProfile::for_profile(self.profile);
        config.validate()?;
        Ok(config)
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }

    Ok(())
}

/// Log the effective configuration
pub fn log_config(profile: ProfileName, config: &ResilienceConfig) {
    tracing::info!("Profile: {}", profile);
    tracing::info!(
        "Retry: {} attempts, {:?} initial, {:?} max, x{} backoff, {:.0}% jitter",
        config.retry.max_attempts,
        config.retry.initial_delay,
        config.retry.max_delay,
        config.retry.backoff_multiplier,
        config.retry.jitter_ratio * 100.0
    );
    tracing::info!(
        "Circuit breaker: opens after {} failures, probes after {:?}, closes after {} probe(s)",
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.reset_timeout,
        config.circuit_breaker.half_open_max_attempts
    );
}
