//! An abstraction over async runtimes, used by the push controller to
//! schedule its periodic collection worker.
//!
//! A builtin implementation for [Tokio] is provided behind the `rt-tokio`
//! feature.
//!
//! [Tokio]: https://crates.io/crates/tokio
use futures_util::{future::BoxFuture, stream::Stream};
use std::{future::Future, time::Duration};

/// A runtime is an abstraction of an async runtime like [Tokio]. It allows
/// the push controller to work with any current or future runtime
/// implementation.
///
/// [Tokio]: https://crates.io/crates/tokio
pub trait Runtime: Clone + Send + Sync + 'static {
    /// A future stream, which returns items in a previously specified
    /// interval. The item type is not important.
    type Interval: Stream + Send;

    /// A future, which resolves after a previously specified amount of time.
    /// The output type is not important.
    type Delay: Future + Send + Unpin;

    /// Create a [`Stream`], which returns a new item every
    /// [`Duration`].
    fn interval(&self, duration: Duration) -> Self::Interval;

    /// Spawn a new task or thread, which executes the given future.
    ///
    /// This is used to run the push controller's collection worker in the
    /// background. The function does not return a handle; shutdown is
    /// coordinated through a channel handshake instead.
    fn spawn(&self, future: BoxFuture<'static, ()>);

    /// Return a new future, which resolves after the specified
    /// [`Duration`].
    fn delay(&self, duration: Duration) -> Self::Delay;
}

/// Runtime implementation, which works with Tokio's multi thread runtime.
#[cfg(feature = "rt-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "rt-tokio")))]
#[derive(Debug, Clone)]
pub struct Tokio;

#[cfg(feature = "rt-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "rt-tokio")))]
impl Runtime for Tokio {
    type Interval = tokio_stream::wrappers::IntervalStream;
    type Delay = std::pin::Pin<Box<tokio::time::Sleep>>;

    fn interval(&self, duration: Duration) -> Self::Interval {
        let mut interval = tokio::time::interval(duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio_stream::wrappers::IntervalStream::new(interval)
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        #[allow(clippy::let_underscore_future)]
        let _ = tokio::spawn(future);
    }

    fn delay(&self, duration: Duration) -> Self::Delay {
        Box::pin(tokio::time::sleep(duration))
    }
}
