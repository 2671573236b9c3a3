//! Fallback executor
//!
//! Tries a primary operation, then each alternative of a [`FallbackChain`] in
//! order. The first success wins; when everything fails, the last failure is
//! returned. Shares no state with the retry executor or any breaker.

use super::classify::classify;
use super::composite::RecoveryStrategy;
use super::operation::{boxed, BoxFuture, BoxOperation};
use crate::core::{ErrorDescriptor, ResilienceError};
use crate::monitoring::{LogLevel, SharedLogger, TracingLogger};
use std::future::Future;
use std::sync::Arc;

/// Ordered alternatives consulted after the primary fails
pub struct FallbackChain<'a, T> {
    alternatives: Vec<BoxOperation<'a, T>>,
}

impl<'a, T: 'a> FallbackChain<'a, T> {
    pub fn new() -> Self {
        Self {
            alternatives: Vec::new(),
        }
    }

    /// Append an alternative
    pub fn then<F, Fut>(mut self, alternative: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        self.alternatives.push(boxed(alternative));
        self
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }
}

impl<'a, T: 'a> Default for FallbackChain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a primary operation with ordered fallbacks
#[derive(Clone)]
pub struct FallbackExecutor {
    logger: SharedLogger,
}

impl FallbackExecutor {
    pub fn new() -> Self {
        Self {
            logger: TracingLogger::shared(),
        }
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Primary first, then `chain` in order; first success wins
    pub async fn execute_with_fallback<'a, T, F, Fut>(
        &self,
        primary: F,
        chain: FallbackChain<'a, T>,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.log_attempt(0, true);
        let mut last = match primary().await {
            Ok(value) => return Ok(value),
            Err(error) => self.failed(0, true, error),
        };

        for (offset, mut alternative) in chain.alternatives.into_iter().enumerate() {
            let index = offset + 1;
            self.log_attempt(index, false);
            match alternative().await {
                Ok(value) => {
                    self.log_recovered(index);
                    return Ok(value);
                }
                Err(error) => last = self.failed(index, false, error),
            }
        }

        Err(ResilienceError::Failed(last))
    }

    fn log_attempt(&self, index: usize, primary: bool) {
        self.logger.log(
            LogLevel::Debug,
            "attempting operation",
            None,
            &[
                ("index", index.to_string()),
                ("primary", primary.to_string()),
            ],
        );
    }

    fn log_recovered(&self, index: usize) {
        self.logger.log(
            LogLevel::Info,
            "fallback succeeded",
            None,
            &[("index", index.to_string())],
        );
    }

    fn failed(&self, index: usize, primary: bool, error: anyhow::Error) -> ErrorDescriptor {
        let descriptor = classify(error);
        self.logger.log(
            LogLevel::Warn,
            if primary {
                "primary operation failed"
            } else {
                "fallback failed"
            },
            Some(&descriptor),
            &[
                ("index", index.to_string()),
                ("primary", primary.to_string()),
            ],
        );
        descriptor
    }
}

impl Default for FallbackExecutor {
    fn default() -> Self {
        Self::new()
    }
}

type Alternative<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Recovery strategy that replaces a failed operation with alternatives
///
/// Unlike [`FallbackChain`], the alternatives are reusable, so one strategy
/// can serve any number of recoveries.
pub struct FallbackStrategy<T> {
    name: String,
    alternatives: Vec<Alternative<T>>,
    executor: FallbackExecutor,
}

impl<T: Send + 'static> FallbackStrategy<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alternatives: Vec::new(),
            executor: FallbackExecutor::new(),
        }
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.executor = self.executor.with_logger(logger);
        self
    }

    /// Append an alternative
    pub fn then<F, Fut>(mut self, alternative: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.alternatives
            .push(Arc::new(move || -> BoxFuture<'static, anyhow::Result<T>> {
                Box::pin(alternative())
            }));
        self
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    async fn run(&self, descriptor: &ErrorDescriptor) -> Result<T, ResilienceError> {
        let mut alternatives = self.alternatives.iter();
        let Some(first) = alternatives.next() else {
            return Err(ResilienceError::Failed(descriptor.clone()));
        };

        let chain = alternatives.fold(FallbackChain::new(), |chain, alternative| {
            let alternative = Arc::clone(alternative);
            chain.then(move || alternative())
        });
        self.executor.execute_with_fallback(|| first(), chain).await
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for FallbackStrategy<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_recover(&self, _descriptor: &ErrorDescriptor) -> bool {
        !self.alternatives.is_empty()
    }

    fn recover<'a>(
        &'a self,
        descriptor: &'a ErrorDescriptor,
        _operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>> {
        Box::pin(self.run(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;
    use crate::testing::RecordingLogger;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_primary_success_skips_chain() {
        let executor = FallbackExecutor::new();
        let chain = FallbackChain::new().then(|| async { Ok(2) });

        let result = executor
            .execute_with_fallback(|| async { Ok(1) }, chain)
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_chain_borrows_local_state() {
        let calls = Mutex::new(Vec::new());
        let log = &calls;
        let chain = FallbackChain::new().then(move || async move {
            log.lock().push("cache");
            Ok::<_, anyhow::Error>("stale profile")
        });

        let result = FallbackExecutor::new()
            .execute_with_fallback(
                move || async move {
                    log.lock().push("primary");
                    Err(Failure::status(503, "down").into())
                },
                chain,
            )
            .await;

        assert_eq!(result.unwrap(), "stale profile");
        assert_eq!(*log.lock(), vec!["primary", "cache"]);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_descriptor() {
        let logger = Arc::new(RecordingLogger::new());
        let chain = FallbackChain::new()
            .then(|| async { Err::<(), _>(Failure::status(500, "replica down").into()) })
            .then(|| async { Err(Failure::status(404, "not cached").into()) });

        let err = FallbackExecutor::new()
            .with_logger(logger.clone())
            .execute_with_fallback(
                || async { Err(Failure::status(503, "primary down").into()) },
                chain,
            )
            .await
            .unwrap_err();

        let descriptor = err.descriptor().unwrap();
        assert_eq!(descriptor.status_code(), Some(404));
        assert_eq!(descriptor.message(), "not cached");
        assert_eq!(logger.count(LogLevel::Warn), 3);
        assert_eq!(logger.count(LogLevel::Debug), 3);
    }

    #[tokio::test]
    async fn test_strategy_is_reusable() {
        let strategy = FallbackStrategy::new("defaults")
            .then(|| async { Err(Failure::status(500, "cache miss").into()) })
            .then(|| async { Ok(42) });
        let descriptor = crate::testing::status_descriptor(503);
        let mut operation = boxed(|| async { Ok(0) });

        assert!(strategy.can_recover(&descriptor));
        for _ in 0..2 {
            let value = strategy.recover(&descriptor, &mut operation).await.unwrap();
            assert_eq!(value, 42);
        }
    }

    #[test]
    fn test_empty_strategy_cannot_recover() {
        let strategy: FallbackStrategy<u8> = FallbackStrategy::new("empty");
        assert!(!strategy.can_recover(&crate::testing::status_descriptor(503)));
    }
}
