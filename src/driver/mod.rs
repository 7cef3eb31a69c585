pub mod native;

pub use native::{NativeDriver, NativeSubscription};

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::resp::types::RespValue;

/// The store driver the adapter sits on.
///
/// Store error replies come back as `RespValue::Error` / `BulkError`
/// frames; `Err` means the call itself failed (I/O, timeout, closed).
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;
    type Subscription: Subscription;

    /// Establish (and authenticate) the shared command path.
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Execute one command on the shared path.
    fn execute(&self, args: &[String]) -> impl Future<Output = Result<RespValue>> + Send;

    /// Execute a batch, returning one outcome per command in order.
    ///
    /// The default runs the commands one by one; drivers that can batch
    /// should send them in a single round trip.
    fn pipeline(
        &self,
        commands: &[Vec<String>],
    ) -> impl Future<Output = Result<Vec<Result<RespValue>>>> + Send {
        async move {
            let mut replies = Vec::with_capacity(commands.len());
            for args in commands {
                replies.push(self.execute(args).await);
            }
            Ok(replies)
        }
    }

    /// Open an exclusive connection.
    fn dedicated(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Open a subscriber whose channel and pattern sets are fixed for its
    /// whole life.
    fn subscribe(
        &self,
        channels: &[String],
        patterns: &[String],
    ) -> impl Future<Output = Result<Self::Subscription>> + Send;

    /// Release the shared path. Later calls fail with `Error::Closed`
    /// until `connect` runs again.
    fn shutdown(&self);
}

/// An exclusive link: WATCH-pinned transactions and publishing.
pub trait Connection: Send + 'static {
    fn execute(&mut self, args: &[String]) -> impl Future<Output = Result<RespValue>> + Send;

    fn pipeline(
        &mut self,
        commands: &[Vec<String>],
    ) -> impl Future<Output = Result<Vec<RespValue>>> + Send;
}

/// A subscriber connection, polled for deliveries.
pub trait Subscription: Send + 'static {
    /// Wait until the server has acknowledged every declared channel and
    /// pattern.
    fn confirm(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Next delivery, or `Ok(None)` when nothing arrives within `wait`.
    fn next_message(&mut self, wait: Duration) -> impl Future<Output = Result<Option<RawMessage>>> + Send;
}

/// A pub/sub delivery as it came off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Set for pattern deliveries.
    pub pattern: Option<Bytes>,
    pub channel: Bytes,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn exact(channel: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            pattern: None,
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn pattern(pattern: impl Into<Bytes>, channel: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}
