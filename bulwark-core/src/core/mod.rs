//! Core types shared by every resilience component
//!
//! - `errors`: failure taxonomy, [`ErrorDescriptor`], executor errors
//! - `breaker_fsm`: pure circuit breaker state machine

pub mod breaker_fsm;
pub mod errors;

pub use breaker_fsm::{
    Admission, CircuitBreakerRuntime, CircuitState, CircuitStats, Permit, Transition,
};
pub use errors::{
    ConfigError, ErrorCategory, ErrorDescriptor, ErrorSeverity, Failure, ResilienceError,
    StrategyFailure,
};
