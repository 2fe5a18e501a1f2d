use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::error::Error;

/// Async handle returned by every request method.
///
/// Resolves exactly once, to the decoded value or to the [`Error`] that
/// stopped the invocation. Failures raised before the request left the
/// process (unknown method, binding, encoding) are delivered through an
/// already-failed handle, never synchronously.
///
/// # Examples
///
/// ```
/// use courier_core::{Error, ResponseFuture};
/// use courier_core::error::TransportError;
///
/// # futures::executor::block_on(async {
/// let ok = ResponseFuture::ready(42);
/// assert_eq!(ok.await.unwrap(), 42);
///
/// let failed: ResponseFuture<u32> = ResponseFuture::failed(TransportError::PoolClosed.into());
/// assert!(matches!(failed.await, Err(Error::Transport(_))));
/// # });
/// ```
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture<T> {
    inner: BoxFuture<'static, Result<T, Error>>,
}

impl<T> ResponseFuture<T>
where
    T: Send + 'static,
{
    /// Wraps a pending computation.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// An already-failed handle.
    pub fn failed(error: Error) -> Self {
        Self::new(future::ready(Err(error)))
    }

    /// An already-completed handle.
    pub fn ready(value: T) -> Self {
        Self::new(future::ready(Ok(value)))
    }

    /// Maps the successful value, turning mapping failures into errors.
    pub fn and_then<U, F>(self, f: F) -> ResponseFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        ResponseFuture::new(self.inner.map(|result| result.and_then(f)))
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}
