//! Caller-imposed deadlines
//!
//! Dropping an executor's future cancels it. These helpers do that on a
//! timer: [`with_deadline`] bounds a whole resilient call, [`timed`] bounds a
//! single attempt so the timeout is classified as a retryable network failure.

use crate::core::ResilienceError;
use std::future::Future;
use std::time::Duration;

/// Fail with [`ResilienceError::DeadlineExceeded`] if `future` takes longer
/// than `deadline`
pub async fn with_deadline<T, Fut>(deadline: Duration, future: Fut) -> Result<T, ResilienceError>
where
    Fut: Future<Output = Result<T, ResilienceError>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(ResilienceError::DeadlineExceeded(deadline)),
    }
}

/// Bound one attempt of an operation
pub async fn timed<T, Fut>(limit: Duration, future: Fut) -> anyhow::Result<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    tokio::time::timeout(limit, future).await?
}
