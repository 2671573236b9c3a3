//! Retry executor
//!
//! Runs an operation up to `max_attempts` times, strictly one attempt after
//! another. Each failure is classified; non-retryable failures and the last
//! permitted attempt end the call immediately, otherwise the executor waits
//! for the backoff delay and tries again.

use super::backoff::{ExponentialBackoff, SharedJitter, ThreadRngJitter};
use super::classify::classify;
use super::clock::{SharedSleeper, TokioSleeper};
use super::composite::RecoveryStrategy;
use super::operation::{BoxFuture, BoxOperation};
use crate::config::RetryPolicy;
use crate::core::{ConfigError, ErrorDescriptor, ResilienceError};
use crate::monitoring::{LogLevel, Notice, SharedLogger, SharedNotifier, TracingLogger};
use std::future::Future;
use std::time::Duration;

/// Callback invoked before each retry with the failed attempt number
pub type RetryCallback<'a> = &'a mut (dyn FnMut(u32, &ErrorDescriptor) + Send);

/// Retries an operation with exponential backoff and jitter
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    name: String,
    logger: SharedLogger,
    jitter: SharedJitter,
    sleeper: SharedSleeper,
    notifier: Option<SharedNotifier>,
}

impl RetryExecutor {
    /// Create an executor for a validated policy
    pub fn new(policy: RetryPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            name: "operation".to_string(),
            logger: TracingLogger::shared(),
            jitter: ThreadRngJitter::shared(),
            sleeper: TokioSleeper::shared(),
            notifier: None,
        })
    }

    /// Name used in log events and notices
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_jitter(mut self, jitter: SharedJitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper(mut self, sleeper: SharedSleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` until it succeeds or the policy gives up
    pub async fn execute_with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run(&mut operation, &mut |_: u32, _: &ErrorDescriptor| {}, None)
            .await
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), calling
    /// `on_retry(attempt, descriptor)` before each wait
    pub async fn execute_with_retry_notify<T, F, Fut, R>(
        &self,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        R: FnMut(u32, &ErrorDescriptor) + Send,
    {
        self.run(&mut operation, &mut on_retry, None).await
    }

    /// Continue a sequence whose first attempt already failed with `descriptor`
    ///
    /// The failure counts as attempt 1; the next invocation is attempt 2.
    pub async fn resume_after<T, F, Fut>(
        &self,
        descriptor: ErrorDescriptor,
        mut operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run(
            &mut operation,
            &mut |_: u32, _: &ErrorDescriptor| {},
            Some(descriptor),
        )
        .await
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &mut F,
        on_retry: RetryCallback<'_>,
        prior: Option<ErrorDescriptor>,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut backoff = ExponentialBackoff::with_jitter(self.policy.clone(), self.jitter.clone());
        let mut attempt = 1;
        let mut outcome = match prior {
            Some(descriptor) => Err(descriptor),
            None => self.attempt(operation, attempt).await,
        };

        loop {
            let descriptor = match outcome {
                Ok(value) => return Ok(value),
                Err(descriptor) => descriptor,
            };

            if !descriptor.is_retryable() {
                self.give_up(&descriptor, attempt);
                return Err(ResilienceError::NonRetryable {
                    descriptor,
                    attempts: attempt,
                });
            }
            if attempt >= max_attempts {
                self.give_up(&descriptor, attempt);
                return Err(ResilienceError::Exhausted {
                    descriptor,
                    attempts: attempt,
                });
            }

            let delay = backoff.next_delay().unwrap_or(Duration::ZERO);
            self.logger.log(
                LogLevel::Warn,
                "attempt failed, retrying",
                Some(&descriptor),
                &[
                    ("operation", self.name.clone()),
                    ("attempt", attempt.to_string()),
                    ("max_attempts", max_attempts.to_string()),
                    ("delay_ms", delay.as_millis().to_string()),
                ],
            );
            on_retry(attempt, &descriptor);
            self.sleeper.sleep(delay).await;

            attempt += 1;
            outcome = self.attempt(operation, attempt).await;
        }
    }

    async fn attempt<T, F, Fut>(&self, operation: &mut F, attempt: u32) -> Result<T, ErrorDescriptor>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.logger.log(
            LogLevel::Debug,
            "starting attempt",
            None,
            &[
                ("operation", self.name.clone()),
                ("attempt", attempt.to_string()),
                ("max_attempts", self.policy.max_attempts.to_string()),
            ],
        );
        operation().await.map_err(classify)
    }

    fn give_up(&self, descriptor: &ErrorDescriptor, attempts: u32) {
        self.logger.log(
            LogLevel::Error,
            "operation failed",
            Some(descriptor),
            &[
                ("operation", self.name.clone()),
                ("attempts", attempts.to_string()),
                ("retryable", descriptor.is_retryable().to_string()),
            ],
        );
        if let Some(notifier) = &self.notifier {
            notifier.notify(&Notice::TerminalFailure {
                operation: self.name.clone(),
                descriptor: descriptor.clone(),
                attempts,
            });
        }
    }
}

impl<T: Send + 'static> RecoveryStrategy<T> for RetryExecutor {
    fn name(&self) -> &str {
        "retry"
    }

    fn can_recover(&self, descriptor: &ErrorDescriptor) -> bool {
        descriptor.is_retryable() && self.policy.max_attempts > 1
    }

    fn recover<'a>(
        &'a self,
        descriptor: &'a ErrorDescriptor,
        operation: &'a mut BoxOperation<'_, T>,
    ) -> BoxFuture<'a, Result<T, ResilienceError>> {
        Box::pin(self.resume_after(descriptor.clone(), move || operation()))
    }
}

/// Run `operation` under `policy` with a default executor
pub async fn execute_with_retry<T, F, Fut, R>(
    operation: F,
    policy: RetryPolicy,
    on_retry: R,
) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    R: FnMut(u32, &ErrorDescriptor) + Send,
{
    RetryExecutor::new(policy)?
        .execute_with_retry_notify(operation, on_retry)
        .await
}
