//! Resilience patterns for calling fallible dependencies
//!
//! Provides:
//! - Error classification into a fixed taxonomy
//! - Retry with exponential backoff and jitter
//! - Circuit breaker (plus a registry of named breakers)
//! - Ordered fallbacks
//! - Composite recovery over any of the above
//! - Caller-imposed deadlines

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod clock;
pub mod composite;
pub mod fallback;
pub mod operation;
pub mod registry;
pub mod retry;
pub mod timeout;

pub use backoff::{
    base_delay, jittered_delay, ExponentialBackoff, FixedJitter, JitterSource, SeededJitter,
    SharedJitter, ThreadRngJitter,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerBuilder};
pub use classify::{classify, classify_status};
pub use clock::{
    Clock, ManualClock, SharedClock, SharedSleeper, Sleeper, SystemClock, TokioSleeper,
    VirtualSleeper,
};
pub use composite::{ActionRecovery, CompositeStrategy, RecoveryStrategy, SharedStrategy};
pub use fallback::{FallbackChain, FallbackExecutor, FallbackStrategy};
pub use operation::{boxed, BoxFuture, BoxOperation};
pub use registry::CircuitBreakerRegistry;
pub use retry::{execute_with_retry, RetryCallback, RetryExecutor};
pub use timeout::{timed, with_deadline};
