//! Test helper utilities for driving executors
//!
//! Provides convenient builders and utilities for:
//! - Scripted operations with a fixed sequence of outcomes
//! - Descriptor construction
//! - Latency assertions

use crate::core::{ErrorCategory, ErrorDescriptor, Failure};
use crate::resilience::{classify, BoxFuture};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type FailureFactory = Arc<dyn Fn() -> anyhow::Error + Send + Sync>;

/// Operation that replays a script of outcomes, one per call
///
/// Once the script runs out, every further call fails with the configured
/// failure (or a generic error when none was configured).
pub struct ScriptedOperation<T> {
    script: Arc<Mutex<VecDeque<anyhow::Result<T>>>>,
    exhausted: Option<FailureFactory>,
    calls: Arc<AtomicUsize>,
}

impl<T: Send + 'static> ScriptedOperation<T> {
    pub fn new(outcomes: Vec<anyhow::Result<T>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            exhausted: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Operation that fails on every call
    pub fn always_failing<E, M>(make: M) -> Self
    where
        M: Fn() -> E + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        Self::new(Vec::new()).then_fail_with(make)
    }

    /// Fail `failures` times with `make()`, then succeed with `value`
    pub fn failing_then<E, M>(failures: usize, make: M, value: T) -> Self
    where
        M: Fn() -> E,
        E: Into<anyhow::Error>,
    {
        let mut outcomes: Vec<anyhow::Result<T>> =
            (0..failures).map(|_| Err(make().into())).collect();
        outcomes.push(Ok(value));
        Self::new(outcomes)
    }

    /// Failure returned once the script is used up
    pub fn then_fail_with<E, M>(mut self, make: M) -> Self
    where
        M: Fn() -> E + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.exhausted = Some(Arc::new(move || -> anyhow::Error { make().into() }));
        self
    }

    /// Number of times the operation was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Closure suitable for any executor
    pub fn operation(
        &self,
    ) -> impl FnMut() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync + 'static {
        let script = Arc::clone(&self.script);
        let exhausted = self.exhausted.clone();
        let calls = Arc::clone(&self.calls);

        move || -> BoxFuture<'static, anyhow::Result<T>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let next = script.lock().pop_front();
            let outcome = match next {
                Some(outcome) => outcome,
                None => Err(match &exhausted {
                    Some(make) => make(),
                    None => anyhow::anyhow!("scripted operation exhausted"),
                }),
            };
            Box::pin(async move { outcome })
        }
    }
}

/// Descriptor for a labelled failure with a status code
pub fn status_descriptor(status_code: u16) -> ErrorDescriptor {
    classify(Failure::status(status_code, format!("status {}", status_code)).into())
}

/// Descriptor with the taxonomy defaults for `category`
pub fn category_descriptor(category: ErrorCategory) -> ErrorDescriptor {
    let failure = Failure::categorized(category, category.as_str());
    ErrorDescriptor::from_category(category, failure.into())
}

/// Assert that an operation completes within expected latency
pub fn assert_within_latency<F>(max_latency: Duration, operation: F, operation_name: &str)
where
    F: FnOnce(),
{
    let start = Instant::now();
    operation();
    let elapsed = start.elapsed();

    assert!(
        elapsed <= max_latency,
        "{} took {:?}, expected <= {:?}",
        operation_name,
        elapsed,
        max_latency
    );
}
