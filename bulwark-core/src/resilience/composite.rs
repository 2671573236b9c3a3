//! Composite recovery strategy
//!
//! Every strategy shares one contract: given the descriptor of a failure and
//! the operation that produced it, try to produce a value. The composite
//! consults its strategies in order and stops at the first success; failed
//! strategies are collected so callers see every recovery that was tried.

use super::classify::classify;
use super::operation::{boxed, BoxFuture, BoxOperation};
use crate::core::{ErrorCategory, ErrorDescriptor, ResilienceError, StrategyFailure};
use crate::monitoring::{LogLevel, SharedLogger, TracingLogger};
use std::future::Future;
use std::sync::Arc;

/// A way of recovering from a classified failure
pub trait RecoveryStrategy<T: Send + 'static>: Send + Sync {
    /// Name used in logs and in [`StrategyFailure`]
    fn name(&self) -> &str;

    /// Whether this strategy applies to `descriptor`
    fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool;

    /// Attempt recovery; may invoke `operation` again
    fn recover<'a>(
        &'a self,
        descriptor: &'a ErrorDescriptor,
        operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>>;
}

pub type SharedStrategy<T> = Arc<dyn RecoveryStrategy<T>>;

/// Ordered list of recovery strategies
pub struct CompositeStrategy<T: Send + 'static> {
    name: String,
    strategies: Vec<SharedStrategy<T>>,
    logger: SharedLogger,
}

impl<T: Send + 'static> CompositeStrategy<T> {
    pub fn new() -> Self {
        Self {
            name: "composite".to_string(),
            strategies: Vec::new(),
            logger: TracingLogger::shared(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Append a strategy; strategies are consulted in insertion order
    pub fn with_strategy<S>(self, strategy: S) -> Self
    where
        S: RecoveryStrategy<T> + 'static,
    {
        self.with_shared(Arc::new(strategy))
    }

    /// Append a strategy that is also used elsewhere
    pub fn with_shared(mut self, strategy: SharedStrategy<T>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in consultation order
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// True iff any strategy applies to `descriptor`
    pub fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool {
        self.strategies
            .iter()
            .any(|strategy| strategy.can_recover(descriptor))
    }

    /// Try each applicable strategy in order until one succeeds
    ///
    /// Fails with [`ResilienceError::RecoveryFailed`] listing every strategy
    /// that was attempted (none, if no strategy applied).
    pub async fn recover(
        &self,
        descriptor: &ErrorDescriptor,
        operation: &mut BoxOperation<'_, T>,
    ) -> Result<T, ResilienceError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            if !strategy.can_recover(descriptor) {
                continue;
            }

            self.logger.log(
                LogLevel::Info,
                "attempting recovery",
                Some(descriptor),
                &[
                    ("composite", self.name.clone()),
                    ("strategy", strategy.name().to_string()),
                ],
            );

            match strategy.recover(descriptor, operation).await {
                Ok(value) => {
                    self.logger.log(
                        LogLevel::Info,
                        "recovery succeeded",
                        None,
                        &[
                            ("composite", self.name.clone()),
                            ("strategy", strategy.name().to_string()),
                        ],
                    );
                    return Ok(value);
                }
                Err(error) => {
                    self.logger.log(
                        LogLevel::Warn,
                        "recovery strategy failed",
                        error.descriptor(),
                        &[
                            ("composite", self.name.clone()),
                            ("strategy", strategy.name().to_string()),
                            ("error", error.to_string()),
                        ],
                    );
                    failures.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        error,
                    });
                }
            }
        }

        self.logger.log(
            LogLevel::Error,
            "all recovery strategies failed",
            Some(descriptor),
            &[
                ("composite", self.name.clone()),
                ("attempted", failures.len().to_string()),
            ],
        );
        Err(ResilienceError::RecoveryFailed {
            descriptor: descriptor.clone(),
            failures,
        })
    }

    /// Run `operation` once and recover from its failure if possible
    ///
    /// A failure no strategy applies to is returned as
    /// [`ResilienceError::Failed`].
    pub async fn execute<'a, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        let mut operation = boxed(operation);
        let descriptor = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => classify(error),
        };

        if !self.can_recover(&descriptor) {
            return Err(ResilienceError::Failed(descriptor));
        }
        self.recover(&descriptor, &mut operation).await
    }
}

impl<T: Send + 'static> Default for CompositeStrategy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for CompositeStrategy<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool {
        CompositeStrategy::can_recover(self, descriptor)
    }

    fn recover<'a>(
        &'a self,
        descriptor: &'a ErrorDescriptor,
        operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>> {
        Box::pin(CompositeStrategy::recover(self, descriptor, operation))
    }
}

type Predicate = Box<dyn Fn(&ErrorDescriptor) -> bool + Send + Sync>;
type Action = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Runs an out-of-band action, then invokes the operation once more
///
/// Covers recoveries that repair something outside the operation, such as
/// refreshing a credential before replaying a request.
pub struct ActionRecovery {
    name: String,
    predicate: Predicate,
    action: Action,
}

impl ActionRecovery {
    pub fn new<P, A, Fut>(name: impl Into<String>, predicate: P, action: A) -> Self
    where
        P: Fn(&ErrorDescriptor) -> bool + Send + Sync + 'static,
        A: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            action: Box::new(move || -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(action())
            }),
        }
    }

    /// Applies to every failure of `category`
    pub fn for_category<A, Fut>(name: impl Into<String>, category: ErrorCategory, action: A) -> Self
    where
        A: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(
            name,
            move |descriptor: &ErrorDescriptor| descriptor.category() == category,
            action,
        )
    }

    async fn run<T>(&self, operation: &mut BoxOperation<'_, T>) -> Result<T, ResilienceError> {
        (self.action)()
            .await
            .map_err(|error| ResilienceError::Failed(classify(error)))?;
        operation()
            .await
            .map_err(|error| ResilienceError::Failed(classify(error)))
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for ActionRecovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool {
        (self.predicate)(descriptor)
    }

    fn recover<'a>(
        &'a self,
        _descriptor: &'a ErrorDescriptor,
        operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>> {
        Box::pin(self.run(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;
    use crate::testing::{category_descriptor, status_descriptor};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixed {
        name: &'static str,
        applies: bool,
        outcome: Result<u32, u16>,
        calls: AtomicU32,
    }

    impl Fixed {
        fn new(name: &'static str, applies: bool, outcome: Result<u32, u16>) -> Arc<Self> {
            Arc::new(Self {
                name,
                applies,
                outcome,
                calls: AtomicU32::new(0),
            })
        }
    }

    impl RecoveryStrategy<u32> for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn can_recover(&self, _: &ErrorDescriptor) -> bool {
            self.applies
        }

        fn recover<'a>(
            &'a self,
            _: &'a ErrorDescriptor,
            _: &'a mut BoxOperation<'_, u32>,
        ) -> BoxFuture<'a, Result<u32, ResilienceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcome
                .map_err(|code| ResilienceError::Failed(status_descriptor(code)));
            Box::pin(async move { outcome })
        }
    }

    fn noop() -> BoxOperation<'static, u32> {
        boxed(|| async { Ok(0) })
    }

    #[tokio::test]
    async fn test_first_applicable_success_wins() {
        let skipped = Fixed::new("skipped", false, Ok(1));
        let failing = Fixed::new("failing", true, Err(503));
        let winning = Fixed::new("winning", true, Ok(3));
        let unused = Fixed::new("unused", true, Ok(4));

        let composite = CompositeStrategy::new()
            .with_shared(skipped.clone())
            .with_shared(failing.clone())
            .with_shared(winning.clone())
            .with_shared(unused.clone());

        let value = composite
            .recover(&status_descriptor(503), &mut noop())
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(skipped.calls.load(Ordering::SeqCst), 0);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let composite = CompositeStrategy::new()
            .with_shared(Fixed::new("first", true, Err(500)))
            .with_shared(Fixed::new("second", true, Err(404)));

        let err = composite
            .recover(&status_descriptor(503), &mut noop())
            .await
            .unwrap_err();

        match err {
            ResilienceError::RecoveryFailed {
                descriptor,
                failures,
            } => {
                assert_eq!(descriptor.status_code(), Some(503));
                let names: Vec<_> = failures.iter().map(|f| f.strategy.as_str()).collect();
                assert_eq!(names, vec!["first", "second"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_applicable_strategy() {
        let composite = CompositeStrategy::new().with_shared(Fixed::new("never", false, Ok(1)));
        let descriptor = status_descriptor(400);

        assert!(!composite.can_recover(&descriptor));
        let err = composite
            .recover(&descriptor, &mut noop())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResilienceError::RecoveryFailed { ref failures, .. } if failures.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_action_recovery_replays_operation() {
        let refreshed = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&refreshed);
        let refresh = ActionRecovery::for_category("refresh-token", ErrorCategory::Authentication, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let composite = CompositeStrategy::new().with_strategy(refresh);
        let flag = Arc::clone(&refreshed);
        let result = composite
            .execute(move || {
                let flag = Arc::clone(&flag);
                async move {
                    if flag.load(Ordering::SeqCst) == 0 {
                        Err(Failure::status(401, "token expired").into())
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_without_applicable_strategy() {
        let refresh = ActionRecovery::for_category("refresh-token", ErrorCategory::Authentication, || async {
            Ok(())
        });
        let composite = CompositeStrategy::new().with_strategy(refresh);

        let err = composite
            .execute(|| async { Err::<u32, _>(Failure::status(422, "bad input").into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::Failed(ref d) if d.status_code() == Some(422)));
        assert!(!composite.can_recover(&category_descriptor(ErrorCategory::Validation)));
    }

    #[tokio::test]
    async fn test_nested_composites() {
        let inner = CompositeStrategy::new()
            .with_name("inner")
            .with_shared(Fixed::new("inner-ok", true, Ok(9)));
        let outer = CompositeStrategy::new()
            .with_shared(Fixed::new("outer-fail", true, Err(502)))
            .with_strategy(inner);

        assert_eq!(outer.names(), vec!["outer-fail", "inner"]);
        let value = outer
            .recover(&status_descriptor(503), &mut noop())
            .await
            .unwrap();
        assert_eq!(value, 9);
    }
}
