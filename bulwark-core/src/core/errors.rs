//! Error taxonomy for the resilience core
//!
//! Every failure that passes through an executor is labelled with an
//! [`ErrorDescriptor`] so callers can map it to user-facing handling without
//! guessing. Executors themselves fail with [`ResilienceError`], which keeps a
//! circuit-breaker rejection distinct from the wrapped operation's own errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Broad origin of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Transport-level problem (refused connection, DNS, aborted fetch)
    Network,
    /// Caller supplied invalid input
    Validation,
    /// Caller is not authenticated (or the credential expired)
    Authentication,
    /// Caller is authenticated but not allowed
    Authorization,
    /// Request was well-formed but the domain refused it
    BusinessLogic,
    /// Failure inside our own process or platform
    System,
    /// Upstream dependency failed or throttled us
    ExternalService,
    /// Persistence layer failure
    Database,
    /// Nothing recognizable
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        Self::Network,
        Self::Validation,
        Self::Authentication,
        Self::Authorization,
        Self::BusinessLogic,
        Self::System,
        Self::ExternalService,
        Self::Database,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::BusinessLogic => "business_logic",
            Self::System => "system",
            Self::ExternalService => "external_service",
            Self::Database => "database",
            Self::Unknown => "unknown",
        }
    }

    /// Severity assigned when nothing more specific is known
    pub fn default_severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation => ErrorSeverity::Low,
            Self::BusinessLogic | Self::Unknown => ErrorSeverity::Medium,
            Self::Network
            | Self::Authentication
            | Self::Authorization
            | Self::ExternalService => ErrorSeverity::High,
            Self::System | Self::Database => ErrorSeverity::Critical,
        }
    }

    /// Whether failures of this category are retried by default
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::System | Self::ExternalService | Self::Database
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified view of a single failure
///
/// Created fresh for every failure and never persisted. Cloning shares the
/// original cause.
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    category: ErrorCategory,
    severity: ErrorSeverity,
    retryable: bool,
    status_code: Option<u16>,
    cause: Arc<anyhow::Error>,
}

impl ErrorDescriptor {
    pub fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        retryable: bool,
        cause: anyhow::Error,
    ) -> Self {
        Self {
            category,
            severity,
            retryable,
            status_code: None,
            cause: Arc::new(cause),
        }
    }

    /// Descriptor using the taxonomy defaults for `category`
    pub fn from_category(category: ErrorCategory, cause: anyhow::Error) -> Self {
        Self::new(
            category,
            category.default_severity(),
            category.default_retryable(),
            cause,
        )
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// The original failure
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// Top-level message of the original failure
    pub fn message(&self) -> String {
        self.cause.to_string()
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}", self.category, self.severity)?;
        if let Some(code) = self.status_code {
            write!(f, ", status {}", code)?;
        }
        write!(f, "] {}", self.cause)
    }
}

/// Failure raised by an operation with an explicit label
///
/// Operations may fail with any error type; this one lets them state what
/// they know (status code, category, transport problem) instead of leaving
/// the classifier to guess from the message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
    status_code: Option<u16>,
    category: Option<ErrorCategory>,
    transport: bool,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            category: None,
            transport: false,
        }
    }

    /// Failure carrying an HTTP-style status code
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(message).with_status(status_code)
    }

    /// Connection refused, DNS failure, aborted fetch and the like
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            transport: true,
            ..Self::new(message)
        }
    }

    /// Failure whose category is already known to the caller
    pub fn categorized(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::new(message).with_category(category)
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.category
    }

    pub fn is_transport(&self) -> bool {
        self.transport
    }
}

/// One strategy's failed attempt inside a composite recovery
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: ResilienceError,
}

/// Errors returned by the resilience executors
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Retryable failure on the last permitted attempt
    #[error("gave up after {attempts} attempt(s): {descriptor}")]
    Exhausted {
        descriptor: ErrorDescriptor,
        attempts: u32,
    },

    /// Failure the classifier marked as not worth retrying
    #[error("non-retryable failure on attempt {attempts}: {descriptor}")]
    NonRetryable {
        descriptor: ErrorDescriptor,
        attempts: u32,
    },

    /// Classified failure passed through unchanged
    #[error("{0}")]
    Failed(ErrorDescriptor),

    /// Circuit breaker rejected the call without invoking the operation
    #[error("circuit breaker '{name}' is open (retry in {retry_after:?})")]
    CircuitOpen { name: String, retry_after: Duration },

    /// Every applicable recovery strategy failed
    #[error("all recovery strategies failed for {descriptor} ({} attempted)", .failures.len())]
    RecoveryFailed {
        descriptor: ErrorDescriptor,
        failures: Vec<StrategyFailure>,
    },

    /// Caller-imposed deadline elapsed
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl ResilienceError {
    /// Classified failure behind this error, if the operation itself failed
    pub fn descriptor(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Exhausted { descriptor, .. }
            | Self::NonRetryable { descriptor, .. }
            | Self::RecoveryFailed { descriptor, .. } => Some(descriptor),
            Self::Failed(descriptor) => Some(descriptor),
            Self::CircuitOpen { .. } | Self::DeadlineExceeded(_) | Self::InvalidConfig(_) => None,
        }
    }

    /// Number of attempts made, for errors raised by the retry executor
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Rejected policy values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("max_delay ({max:?}) must not be below initial_delay ({initial:?})")]
    DelayRange { initial: Duration, max: Duration },

    #[error("backoff_multiplier must be finite and >= 1.0, got {0}")]
    Multiplier(f64),

    #[error("jitter_ratio must lie within [0, 1], got {0}")]
    JitterRatio(f64),

    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("half_open_max_attempts must be at least 1")]
    ZeroHalfOpenAttempts,
}
