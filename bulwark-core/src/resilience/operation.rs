//! Type-erased async operations
//!
//! Fallback chains and composite strategies hold operations whose closure and
//! future types differ. They are boxed once at the edge with [`boxed`].

use std::future::Future;
use std::pin::Pin;

/// Owned, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Zero-argument async operation that may be invoked repeatedly
pub type BoxOperation<'a, T> = Box<dyn FnMut() -> BoxFuture<'a, anyhow::Result<T>> + Send + 'a>;

/// Box an async closure into a [`BoxOperation`]
pub fn boxed<'a, T, F, Fut>(mut operation: F) -> BoxOperation<'a, T>
where
    F: FnMut() -> Fut + Send + 'a,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'a,
    T: 'a,
{
    Box::new(move || -> BoxFuture<'a, anyhow::Result<T>> { Box::pin(operation()) })
}
