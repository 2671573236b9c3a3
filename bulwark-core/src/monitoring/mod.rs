//! Monitoring collaborators
//!
//! - Logger: structured events from every executor
//! - Observers: circuit breaker transitions and rejections
//! - Notifier: user-facing notices (rendering is out of scope)
//! - Metrics: Prometheus counters and gauges for breakers

pub mod logger;
pub mod metrics;
pub mod observer;

pub use logger::{
    format_metadata, LogLevel, Metadata, NoopLogger, ResilienceLogger, SharedLogger,
    TracingLogger, LOG_TARGET,
};
pub use metrics::{MetricsObserver, ResilienceMetrics};
pub use observer::{
    CircuitObserver, Notice, Notifier, ObserverSet, SharedNotifier, SharedObserver,
};
