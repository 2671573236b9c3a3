//! Bulwark Core - Client-Side Resilience for Fallible Async Calls
//!
//! Bulwark decides, for any fallible async operation, whether to retry it,
//! how long to wait between attempts, and when repeated failure should trip a
//! circuit breaker that fails fast instead of hammering a degraded dependency.
//!
//! ## Architecture
//! - **Classifier** labels every failure with an [`ErrorDescriptor`]
//! - **Executors** (retry, circuit breaker, fallback) consume labels to decide
//!   control flow
//! - **Composite strategy** chains recoveries behind one contract
//! - **Collaborators** (logger, observer, notifier, clock, sleeper, jitter)
//!   are injected, never global
//!
//! ## Core Modules
//! - `core`: Error taxonomy, executor errors, breaker state machine
//! - `config`: Validated policies and named profiles
//! - `resilience`: Classifier, executors and strategies
//! - `monitoring`: Logger, observers, notifier, Prometheus metrics
//! - `testing`: Scripted operations and recording doubles

pub mod config;
pub mod core;
pub mod monitoring;
pub mod resilience;
pub mod testing;

// Re-export core types
pub use crate::core::{
    CircuitState, CircuitStats, ConfigError, ErrorCategory, ErrorDescriptor, ErrorSeverity,
    Failure, ResilienceError,
};

pub use config::{CircuitBreakerConfig, ConfigProfile, ProfileName, ResilienceConfig, RetryPolicy};

pub use resilience::{
    classify, execute_with_retry, with_deadline, CircuitBreaker, CircuitBreakerRegistry,
    CompositeStrategy, FallbackChain, FallbackExecutor, RecoveryStrategy, RetryExecutor,
};

/// Prelude for convenient imports
pub mod prelude {
    // Taxonomy and errors
    pub use crate::core::{
        CircuitState, ErrorCategory, ErrorDescriptor, ErrorSeverity, Failure, ResilienceError,
    };

    // Configuration
    pub use crate::config::{CircuitBreakerConfig, ResilienceConfig, RetryPolicy};

    // Executors and strategies
    pub use crate::resilience::{
        boxed, classify, with_deadline, ActionRecovery, BoxOperation, CircuitBreaker,
        CircuitBreakerRegistry, CompositeStrategy, FallbackChain, FallbackExecutor,
        FallbackStrategy, RecoveryStrategy, RetryExecutor,
    };

    // Collaborators
    pub use crate::monitoring::{CircuitObserver, Notifier, ResilienceLogger, TracingLogger};
}
