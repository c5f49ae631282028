//! Deferred results
//!
//! A `DeferredResult` holds a producer instead of a value. Callers issuing
//! many leaf fetches can collect the deferred results first and force them
//! later, so all blocking happens in one resolution phase.
//!
//! Forcing runs the producer. Nothing is memoized: forcing again after a
//! failure runs the producer again, and callers that need the value twice
//! should keep the first outcome.

use crate::error::RemoteResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;

type Producer<T> = Box<dyn Fn() -> BoxFuture<'static, RemoteResult<T>> + Send + Sync>;

/// A lazily evaluated remote result
pub struct DeferredResult<T> {
    producer: Producer<T>,
}

impl<T: Send + 'static> DeferredResult<T> {
    /// Wrap a producer
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        Self {
            producer: Box::new(move || producer().boxed()),
        }
    }

    /// A deferred result that is already known
    pub fn ready(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move || futures::future::ready(Ok(value.clone())))
    }

    /// Run the producer and return its outcome
    pub async fn force(&self) -> RemoteResult<T> {
        (self.producer)().await
    }
}

impl<T> fmt::Debug for DeferredResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredResult { .. }")
    }
}
