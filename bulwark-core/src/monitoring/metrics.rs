//! Prometheus metrics for circuit breakers
//!
//! Provides:
//! - Transition counts per breaker and edge
//! - Rejection counts per breaker
//! - Current state gauge (0 = closed, 1 = open, 2 = half-open)

use super::observer::CircuitObserver;
use crate::core::CircuitState;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// Breaker metric families registered on one Prometheus registry
#[derive(Clone)]
pub struct ResilienceMetrics {
    registry: Arc<Registry>,
    /// State changes by breaker, old state and new state
    pub transitions_total: IntCounterVec,
    /// Calls refused without invoking the operation
    pub rejections_total: IntCounterVec,
    /// Current state per breaker
    pub state: IntGaugeVec,
}

impl ResilienceMetrics {
    /// Create metrics on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register metrics on an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let transitions_total = IntCounterVec::new(
            Opts::new(
                "circuit_transitions_total",
                "Total number of circuit breaker state transitions",
            )
            .namespace("bulwark"),
            &["breaker", "from", "to"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "circuit_rejections_total",
                "Total number of calls rejected by an open circuit",
            )
            .namespace("bulwark"),
            &["breaker"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let state = IntGaugeVec::new(
            Opts::new(
                "circuit_state",
                "Current circuit state (0=closed, 1=open, 2=half_open)",
            )
            .namespace("bulwark"),
            &["breaker"],
        )?;
        registry.register(Box::new(state.clone()))?;

        info!("Resilience metrics registered");

        Ok(Self {
            registry,
            transitions_total,
            rejections_total,
            state,
        })
    }

    /// Get the underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Observer that records into [`ResilienceMetrics`]
#[derive(Clone)]
pub struct MetricsObserver {
    metrics: ResilienceMetrics,
}

impl MetricsObserver {
    pub fn new(metrics: ResilienceMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &ResilienceMetrics {
        &self.metrics
    }
}

impl CircuitObserver for MetricsObserver {
    fn on_transition(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        self.metrics
            .transitions_total
            .with_label_values(&[breaker, from.as_str(), to.as_str()])
            .inc();
        self.metrics
            .state
            .with_label_values(&[breaker])
            .set(to.as_gauge());
    }

    fn on_rejection(&self, breaker: &str) {
        self.metrics
            .rejections_total
            .with_label_values(&[breaker])
            .inc();
    }
}
