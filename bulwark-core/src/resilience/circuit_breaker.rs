//! Circuit breaker pattern for preventing cascade failures
//!
//! Wraps [`CircuitBreakerRuntime`] in a mutex and runs operations through it.
//! The lock is only held to admit a call and to record its outcome, never
//! across an `.await`.
//!
//! Transitions are queued while the state lock is held and delivered to the
//! observer after it is released, one deliverer at a time, so observers see
//! them in the order they happened. A transition raised while another thread
//! is delivering is handed to that thread instead of waiting on it.
//!
//! Closed (normal) → Open (tripped) → HalfOpen (testing recovery)

use super::classify::classify;
use super::clock::{SharedClock, SystemClock};
use super::composite::RecoveryStrategy;
use super::operation::{BoxFuture, BoxOperation};
use crate::config::CircuitBreakerConfig;
use crate::core::{
    Admission, CircuitBreakerRuntime, CircuitState, CircuitStats, ConfigError, ErrorDescriptor,
    Permit, ResilienceError, Transition,
};
use crate::monitoring::{
    LogLevel, Notice, ObserverSet, SharedLogger, SharedNotifier, SharedObserver, TracingLogger,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe circuit breaker
///
/// Cloning yields another handle to the same breaker.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: CircuitBreakerConfig,
    runtime: Mutex<CircuitBreakerRuntime>,
    /// Transitions applied but not yet delivered, in order
    pending: Mutex<VecDeque<Transition>>,
    delivering: Mutex<()>,
    clock: SharedClock,
    observer: SharedObserver,
    logger: SharedLogger,
    notifier: Option<SharedNotifier>,
}

/// Builder for [`CircuitBreaker`] with injectable collaborators
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    observer: Option<SharedObserver>,
    logger: SharedLogger,
    notifier: Option<SharedNotifier>,
}

impl CircuitBreakerBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Receives every state transition, in order (defaults to none)
    ///
    /// Transitions are logged at INFO through the logger either way.
    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    /// Build from a config the caller has already validated
    pub(crate) fn assemble(self) -> CircuitBreaker {
        let observer = match self.observer {
            Some(observer) => observer,
            None => Arc::new(ObserverSet::new()),
        };

        CircuitBreaker {
            inner: Arc::new(Inner {
                runtime: Mutex::new(CircuitBreakerRuntime::new(self.config.clone())),
                pending: Mutex::new(VecDeque::new()),
                delivering: Mutex::new(()),
                name: self.name,
                config: self.config,
                clock: self.clock,
                observer,
                logger: self.logger,
                notifier: self.notifier,
            }),
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker with the system clock and logging observer
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::builder(name, config).build()
    }

    pub fn builder(name: impl Into<String>, config: CircuitBreakerConfig) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder {
            name: name.into(),
            config,
            clock: SystemClock::shared(),
            observer: None,
            logger: TracingLogger::shared(),
            notifier: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// Run `operation` through the breaker
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without invoking the
    /// operation while the circuit rejects calls.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match self.inner.admit() {
            Ok(guard) => self.inner.run(guard, operation).await,
            Err(retry_after) => Err(ResilienceError::CircuitOpen {
                name: self.inner.name.clone(),
                retry_after,
            }),
        }
    }

    /// Like [`execute`](Self::execute), but runs `fallback` instead of
    /// failing when the circuit rejects the call
    ///
    /// The fallback is not consulted when the operation itself fails.
    pub async fn execute_with_fallback<T, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = anyhow::Result<T>>,
    {
        match self.inner.admit() {
            Ok(guard) => self.inner.run(guard, operation).await,
            Err(retry_after) => {
                self.inner.logger.log(
                    LogLevel::Info,
                    "circuit open, using fallback",
                    None,
                    &[
                        ("breaker", self.inner.name.clone()),
                        ("retry_after_ms", retry_after.as_millis().to_string()),
                    ],
                );
                fallback()
                    .await
                    .map_err(|error| ResilienceError::Failed(classify(error)))
            }
        }
    }

    /// Current state (does not advance Open to HalfOpen)
    pub fn state(&self) -> CircuitState {
        self.inner.runtime.lock().state()
    }

    pub fn stats(&self) -> CircuitStats {
        self.inner.runtime.lock().stats()
    }

    /// Force Closed, clear counters and cancel the pending reset deadline
    pub fn reset(&self) {
        self.inner.apply(|runtime| ((), runtime.reset()));
    }

    /// Force Open; the reset timeout starts now
    pub fn force_open(&self) {
        let now = self.inner.clock.now();
        self.inner.apply(|runtime| ((), runtime.force_open(now)));
    }

    /// Whether a call made now would be admitted
    pub fn is_call_permitted(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.runtime.lock().would_admit(now)
    }
}

impl Inner {
    fn admit(&self) -> Result<PermitGuard<'_>, Duration> {
        let now = self.clock.now();
        let admission = self.apply(|runtime| runtime.admit(now));

        match admission {
            Admission::Permitted(permit) => Ok(PermitGuard {
                inner: self,
                permit: Some(permit),
            }),
            Admission::Rejected { retry_after } => {
                self.reject(retry_after);
                Err(retry_after)
            }
        }
    }

    async fn run<T, F, Fut>(&self, guard: PermitGuard<'_>, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match operation().await {
            Ok(value) => {
                guard.succeeded();
                Ok(value)
            }
            Err(error) => {
                let descriptor = classify(error);
                guard.failed();
                self.logger.log(
                    LogLevel::Debug,
                    "call failed through circuit breaker",
                    Some(&descriptor),
                    &[("breaker", self.name.clone())],
                );
                Err(ResilienceError::Failed(descriptor))
            }
        }
    }

    fn reject(&self, retry_after: Duration) {
        self.logger.log(
            LogLevel::Debug,
            "circuit breaker rejected call",
            None,
            &[
                ("breaker", self.name.clone()),
                ("retry_after_ms", retry_after.as_millis().to_string()),
            ],
        );
        self.observer.on_rejection(&self.name);
        if let Some(notifier) = &self.notifier {
            notifier.notify(&Notice::CircuitOpen {
                breaker: self.name.clone(),
                retry_after,
            });
        }
    }

    /// Run `change` under the state lock, then deliver what it produced
    fn apply<R>(
        &self,
        change: impl FnOnce(&mut CircuitBreakerRuntime) -> (R, Option<Transition>),
    ) -> R {
        let mut runtime = self.runtime.lock();
        let (result, transition) = change(&mut *runtime);
        let Some(transition) = transition else {
            return result;
        };
        // Queue before unlocking so queue order is transition order
        self.pending.lock().push_back(transition);
        drop(runtime);

        self.deliver();
        result
    }

    fn deliver(&self) {
        loop {
            let Some(delivering) = self.delivering.try_lock() else {
                // The current deliverer drains what we queued
                return;
            };
            loop {
                let next = self.pending.lock().pop_front();
                match next {
                    Some(transition) => self.emit(transition),
                    None => break,
                }
            }
            drop(delivering);

            // A transition queued after the drain but before the unlock
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn emit(&self, Transition { from, to }: Transition) {
        self.logger.log(
            LogLevel::Info,
            "circuit breaker state transition",
            None,
            &[
                ("breaker", self.name.clone()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ],
        );
        if to == CircuitState::Open {
            self.logger.log(
                LogLevel::Warn,
                "circuit breaker tripped",
                None,
                &[
                    ("breaker", self.name.clone()),
                    ("from", from.to_string()),
                    (
                        "reset_timeout_ms",
                        self.config.reset_timeout.as_millis().to_string(),
                    ),
                ],
            );
        }
        self.observer.on_transition(&self.name, from, to);
    }
}

/// Admitted call; releases its permit if dropped before completing
struct PermitGuard<'a> {
    inner: &'a Inner,
    permit: Option<Permit>,
}

impl PermitGuard<'_> {
    fn succeeded(mut self) {
        if let Some(permit) = self.permit.take() {
            self.inner.apply(|runtime| ((), runtime.on_success(permit)));
        }
    }

    fn failed(mut self) {
        if let Some(permit) = self.permit.take() {
            let now = self.inner.clock.now();
            self.inner.apply(|runtime| ((), runtime.on_failure(permit, now)));
        }
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.inner.runtime.lock().abandon(permit);
        }
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for CircuitBreaker {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool {
        descriptor.is_retryable() && self.is_call_permitted()
    }

    fn recover<'a>(
        &'a self,
        _descriptor: &'a ErrorDescriptor,
        operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>> {
        Box::pin(self.execute(move || operation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;
    use crate::resilience::ManualClock;
    use crate::testing::RecordingObserver;

    fn breaker(threshold: u32) -> (CircuitBreaker, Arc<ManualClock>, Arc<RecordingObserver>) {
        let clock = Arc::new(ManualClock::new());
        let observer = Arc::new(RecordingObserver::new());
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(1000),
            half_open_max_attempts: 1,
        };
        let breaker = CircuitBreaker::builder("inventory", config)
            .clock(clock.clone())
            .observer(observer.clone())
            .build()
            .unwrap();
        (breaker, clock, observer)
    }

    async fn fail(breaker: &CircuitBreaker) -> ResilienceError {
        breaker
            .execute(|| async { Err::<(), _>(Failure::status(503, "down").into()) })
            .await
            .unwrap_err()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            CircuitBreaker::new("bad", config),
            Err(ConfigError::ZeroFailureThreshold)
        ));
    }

    #[tokio::test]
    async fn test_failure_is_reraised_classified() {
        let (breaker, _, _) = breaker(3);
        match fail(&breaker).await {
            ResilienceError::Failed(descriptor) => {
                assert_eq!(descriptor.status_code(), Some(503));
                assert!(descriptor.is_retryable());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(breaker.stats().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (breaker, _, observer) = breaker(1);
        let other = breaker.clone();

        fail(&breaker).await;
        assert_eq!(other.state(), CircuitState::Open);
        assert_eq!(
            observer.transitions(),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );
    }

    #[tokio::test]
    async fn test_dropped_probe_releases_slot() {
        let (breaker, clock, _) = breaker(1);
        fail(&breaker).await;
        clock.advance(Duration::from_millis(1000));

        {
            // Admitted as the probe, then cancelled before completion
            let pending = breaker.execute(|| std::future::pending::<anyhow::Result<()>>());
            let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;
        }

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.is_call_permitted());
        let result = breaker.execute(|| async { Ok::<_, anyhow::Error>(5) }).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_force_open_and_reset() {
        let (breaker, _, observer) = breaker(3);

        breaker.force_open();
        assert!(fail(&breaker).await.is_circuit_open());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(
            observer.transitions(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::Closed),
            ]
        );
        assert_eq!(observer.rejections(), 1);
    }

    /// Resets its breaker from inside the Closed -> Open callback
    #[derive(Default)]
    struct ResettingObserver {
        breaker: std::sync::OnceLock<CircuitBreaker>,
        seen: Mutex<Vec<(CircuitState, CircuitState)>>,
    }

    impl crate::monitoring::CircuitObserver for ResettingObserver {
        fn on_transition(&self, _breaker: &str, from: CircuitState, to: CircuitState) {
            self.seen.lock().push((from, to));
            if to == CircuitState::Open {
                if let Some(breaker) = self.breaker.get() {
                    breaker.reset();
                }
            }
        }
    }

    #[test]
    fn test_observer_may_reenter_breaker() {
        let observer = Arc::new(ResettingObserver::default());
        let breaker = CircuitBreaker::builder("inventory", CircuitBreakerConfig::default())
            .observer(observer.clone())
            .build()
            .unwrap();
        let _ = observer.breaker.set(breaker.clone());

        breaker.force_open();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(
            *observer.seen.lock(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::Closed),
            ]
        );
    }
}
