//! Logger collaborator
//!
//! Executors never call a global logger; each one holds an injected
//! [`ResilienceLogger`]. The default [`TracingLogger`] forwards to `tracing`,
//! so whatever subscriber the application installed receives the events.

use crate::core::ErrorDescriptor;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Log target used by [`TracingLogger`]
pub const LOG_TARGET: &str = "bulwark::resilience";

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured key/value pairs attached to a log event
pub type Metadata<'a> = &'a [(&'static str, String)];

/// Sink for the events the resilience core emits
pub trait ResilienceLogger: Send + Sync {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&ErrorDescriptor>,
        metadata: Metadata<'_>,
    );
}

/// Shared handle to a logger
pub type SharedLogger = Arc<dyn ResilienceLogger>;

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

impl ResilienceLogger for TracingLogger {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&ErrorDescriptor>,
        metadata: Metadata<'_>,
    ) {
        let fields = format_metadata(metadata);
        let error = error.map(|descriptor| descriptor.to_string());
        let error = error.as_deref();

        match level {
            LogLevel::Debug => debug!(target: LOG_TARGET, error, metadata = %fields, "{}", message),
            LogLevel::Info => info!(target: LOG_TARGET, error, metadata = %fields, "{}", message),
            LogLevel::Warn => warn!(target: LOG_TARGET, error, metadata = %fields, "{}", message),
            LogLevel::Error => error!(target: LOG_TARGET, error, metadata = %fields, "{}", message),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl ResilienceLogger for NoopLogger {
    fn log(&self, _: LogLevel, _: &str, _: Option<&ErrorDescriptor>, _: Metadata<'_>) {}
}

/// Render metadata as `key=value` pairs separated by spaces
pub fn format_metadata(metadata: Metadata<'_>) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}
