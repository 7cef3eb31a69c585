//! The client applications hold.
//!
//! Owns the connection lifecycle, forwards every command through the
//! dispatcher and composes pipelines, transactions and pub/sub.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::command::{ArgValue, CallArgs, Command, ReplyShape, Value};
use crate::commands::Commands;
use crate::config::RedisOptions;
use crate::dispatch::{settle, Dispatcher};
use crate::driver::{Connection, Driver, NativeDriver};
use crate::error::{Error, Result};
use crate::events::{Emitter, Event, EventKind, ListenerId};
use crate::pipeline::Pipeline;
use crate::pubsub::PubSubBridge;
use crate::retry::{with_retry, RetryPolicy};

/// Future returned by every command method of [`Redis`].
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connecting,
    /// Link established, handshake pending.
    Connect,
    Ready,
    End,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connect => "connect",
            Self::Ready => "ready",
            Self::End => "end",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys watched on a pinned connection, consumed by the next `multi().exec()`.
pub(crate) struct WatchState<C> {
    pub(crate) conn: C,
    pub(crate) keys: BTreeSet<String>,
}

struct Inner<D: Driver> {
    driver: Arc<D>,
    options: RedisOptions,
    dispatcher: Dispatcher,
    status: SyncMutex<Status>,
    connect_lock: AsyncMutex<()>,
    events: Arc<Emitter>,
    bridge: PubSubBridge<D>,
    watch: AsyncMutex<Option<WatchState<D::Connection>>>,
}

/// Puts the status back to `Disconnected` when a connect attempt is
/// dropped before reaching `Ready` or `End`.
struct AttemptGuard<'a>(&'a SyncMutex<Status>);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut status = self.0.lock();
        if matches!(*status, Status::Connecting | Status::Connect) {
            debug!("connect attempt cancelled");
            *status = Status::Disconnected;
        }
    }
}

/// A Redis client. Cloning is cheap; clones share one connection state.
pub struct Redis<D: Driver = NativeDriver> {
    inner: Arc<Inner<D>>,
}

impl<D: Driver> Clone for Redis<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Redis<NativeDriver> {
    /// Client over the native driver; nothing is connected yet.
    pub fn with_options(options: RedisOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::new(NativeDriver::new(options.clone()), options))
    }

    /// Parse `redis://…` and open a client (connecting now unless
    /// `lazy_connect` is set).
    ///
    /// ```no_run
    /// # async fn demo() -> rsedis_compat::Result<()> {
    /// use rsedis_compat::{Commands, Redis};
    ///
    /// let redis = Redis::open_url("redis://127.0.0.1:6379/0").await?;
    /// redis.set("greeting", "hello").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open_url(url: &str) -> Result<Self> {
        let options = RedisOptions::from_url(url)?;
        Self::open(NativeDriver::new(options.clone()), options).await
    }
}

impl<D: Driver> Redis<D> {
    /// Wrap `driver` without connecting.
    pub fn new(driver: D, options: RedisOptions) -> Self {
        let driver = Arc::new(driver);
        let events = Arc::new(Emitter::new());
        let bridge = PubSubBridge::new(
            driver.clone(),
            events.clone(),
            options.poll_interval(),
            Duration::from_millis(options.subscribe_settle_ms),
            Duration::from_millis(options.retry_delay_ms),
        );
        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(options.command_timeout()),
                driver,
                options,
                status: SyncMutex::new(Status::Disconnected),
                connect_lock: AsyncMutex::new(()),
                events,
                bridge,
                watch: AsyncMutex::new(None),
            }),
        }
    }

    /// Wrap `driver` and connect, unless `lazy_connect` defers that to the
    /// first command.
    pub async fn open(driver: D, options: RedisOptions) -> Result<Self> {
        options.validate()?;
        let lazy = options.lazy_connect;
        let client = Self::new(driver, options);
        if !lazy {
            client.connect().await?;
        }
        Ok(client)
    }

    pub fn status(&self) -> Status {
        *self.inner.status.lock()
    }

    pub fn options(&self) -> &RedisOptions {
        &self.inner.options
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Register a listener; see [`Event`] for payloads.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    fn set_status(&self, status: Status) -> Status {
        std::mem::replace(&mut *self.inner.status.lock(), status)
    }

    fn emit(&self, event: Event) {
        self.inner.events.emit(&event);
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Connect and run the handshake.
    ///
    /// Emits `connect` once the link is up and `ready` after the
    /// handshake. On failure (after `max_retries` further attempts) emits
    /// `error` then `end`, and the client is left in [`Status::End`].
    pub async fn connect(&self) -> Result<()> {
        let _connecting = self.inner.connect_lock.lock().await;
        // with the lock held, Connecting/Connect can only be left over from
        // a cancelled attempt
        if self.status() == Status::Ready {
            return Ok(());
        }

        self.set_status(Status::Connecting);
        let _attempt = AttemptGuard(&self.inner.status);
        let options = &self.inner.options;
        info!(addr = %options.addr(), db = options.db, "connecting");

        let policy = RetryPolicy::new(
            options.max_retries.saturating_add(1),
            Duration::from_millis(options.retry_delay_ms),
        );
        let driver = &*self.inner.driver;
        let timeout = options.connect_timeout();
        let linked = with_retry(&policy, "connect", move || async move {
            match tokio::time::timeout(timeout, driver.connect()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!("connect timed out after {timeout:?}"))),
            }
        })
        .await;

        let result = match linked {
            Ok(()) => {
                self.set_status(Status::Connect);
                self.emit(Event::Connect);
                self.handshake().await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.set_status(Status::Ready);
                info!(addr = %options.addr(), "ready");
                self.emit(Event::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(addr = %options.addr(), error = %e, "connect failed");
                self.inner.driver.shutdown();
                self.set_status(Status::End);
                self.emit(Event::Error(e.clone()));
                self.emit(Event::End);
                Err(e)
            }
        }
    }

    /// PING on the fresh link.
    async fn handshake(&self) -> Result<()> {
        let reply = self
            .inner
            .dispatcher
            .dispatch(&*self.inner.driver, Command::new("PING"))
            .await?;
        debug!(reply = ?reply, "handshake complete");
        Ok(())
    }

    /// Gate for every command: connect lazily, wait for a connect in
    /// progress, or refuse.
    pub(crate) async fn ensure_ready(&self) -> Result<()> {
        match self.status() {
            Status::Ready => Ok(()),
            Status::Connecting | Status::Connect => {
                drop(self.inner.connect_lock.lock().await);
                match self.status() {
                    Status::Ready => Ok(()),
                    // the attempt we waited on was cancelled
                    Status::Disconnected if self.inner.options.lazy_connect => self.connect().await,
                    Status::Disconnected => Err(Error::NotConnected),
                    _ => Err(Error::Closed),
                }
            }
            Status::Disconnected if self.inner.options.lazy_connect => self.connect().await,
            Status::Disconnected => Err(Error::NotConnected),
            Status::End => Err(Error::Closed),
        }
    }

    /// Close everything gracefully and move to [`Status::End`].
    pub async fn quit(&self) -> Result<Value> {
        self.close().await;
        Ok(Value::Text("OK".into()))
    }

    /// Close everything and move to [`Status::End`].
    pub async fn disconnect(&self) {
        self.close().await;
    }

    async fn close(&self) {
        self.inner.bridge.shutdown().await;
        self.inner.watch.lock().await.take();
        self.inner.driver.shutdown();
        if self.set_status(Status::End) != Status::End {
            info!("connection closed");
            self.emit(Event::End);
        }
    }

    // ── Commands ───────────────────────────────────────────────────

    async fn run(&self, cmd: Command) -> Result<Value> {
        self.ensure_ready().await?;
        self.inner.dispatcher.dispatch(&*self.inner.driver, cmd).await
    }

    /// Any command by name, e.g. `execute_command("OBJECT", ["ENCODING", "k"])`.
    pub async fn execute_command(&self, name: &str, args: impl Into<CallArgs>) -> Result<Value> {
        self.run(Command::new(name).args(args)).await
    }

    // ── Batching ───────────────────────────────────────────────────

    /// Start a non-transactional batch.
    pub fn pipeline(&self) -> Pipeline<D> {
        Pipeline::new(self.clone(), false)
    }

    /// Start a MULTI/EXEC transaction.
    pub fn multi(&self) -> Pipeline<D> {
        Pipeline::new(self.clone(), true)
    }

    /// WATCH keys for the next `multi().exec()`.
    ///
    /// The watch lives on a dedicated connection which that transaction
    /// then runs on; `exec` or [`unwatch`](Self::unwatch) releases it.
    pub async fn watch(&self, keys: impl Into<CallArgs>) -> Result<Value> {
        let keys = keys.into().normalize();
        if keys.is_empty() {
            return Err(Error::Usage("watch needs at least one key".into()));
        }
        self.ensure_ready().await?;

        let mut watch = self.inner.watch.lock().await;
        if watch.is_none() {
            let conn = self.inner.driver.dedicated().await?;
            *watch = Some(WatchState {
                conn,
                keys: BTreeSet::new(),
            });
        }
        let Some(state) = watch.as_mut() else {
            return Err(Error::Closed);
        };

        let mut argv = Vec::with_capacity(keys.len() + 1);
        argv.push("WATCH".to_string());
        argv.extend(keys.iter().cloned());
        match state.conn.execute(&argv).await {
            Ok(reply) => {
                let value = settle(ReplyShape::Raw, reply)?;
                state.keys.extend(keys);
                debug!(keys = state.keys.len(), "watching");
                Ok(value)
            }
            Err(e) => {
                *watch = None;
                Err(e)
            }
        }
    }

    /// Forget every watched key.
    pub async fn unwatch(&self) -> Result<Value> {
        let taken = self.inner.watch.lock().await.take();
        if let Some(mut state) = taken {
            if let Err(e) = state.conn.execute(&["UNWATCH".to_string()]).await {
                debug!(error = %e, "UNWATCH failed, dropping connection");
            }
        }
        Ok(Value::Text("OK".into()))
    }

    pub async fn watched_keys(&self) -> Vec<String> {
        match self.inner.watch.lock().await.as_ref() {
            Some(state) => state.keys.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub(crate) async fn take_watch(&self) -> Option<WatchState<D::Connection>> {
        self.inner.watch.lock().await.take()
    }

    // ── Pub/sub ────────────────────────────────────────────────────

    /// Subscribe to channels; resolves with the channel count once the
    /// subscription is live.
    pub async fn subscribe(&self, channels: &[&str]) -> Result<usize> {
        self.ensure_ready().await?;
        self.inner.bridge.subscribe(channels).await
    }

    pub async fn psubscribe(&self, patterns: &[&str]) -> Result<usize> {
        self.ensure_ready().await?;
        self.inner.bridge.psubscribe(patterns).await
    }

    /// An empty slice unsubscribes from every channel.
    pub async fn unsubscribe(&self, channels: &[&str]) -> Result<usize> {
        self.inner.bridge.unsubscribe(channels).await
    }

    pub async fn punsubscribe(&self, patterns: &[&str]) -> Result<usize> {
        self.inner.bridge.punsubscribe(patterns).await
    }

    pub async fn subscribed_channels(&self) -> Vec<String> {
        self.inner.bridge.channels().await
    }

    pub async fn subscribed_patterns(&self) -> Vec<String> {
        self.inner.bridge.patterns().await
    }
}

impl<D: Driver> Commands for Redis<D> {
    type Reply<'a> = CommandFuture<'a> where Self: 'a;

    fn command(&self, cmd: Command) -> Self::Reply<'_> {
        Box::pin(self.run(cmd))
    }

    /// Goes through the pub/sub bridge's publish connection.
    fn publish(&self, channel: &str, message: impl Into<ArgValue>) -> Self::Reply<'_> {
        let channel = channel.to_string();
        let message: ArgValue = message.into();
        let message = message.into_arg();
        Box::pin(async move {
            self.ensure_ready().await?;
            let receivers = self.inner.bridge.publish(&channel, &message).await?;
            Ok(Value::Int(receivers))
        })
    }
}

impl<D: Driver> fmt::Debug for Redis<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redis")
            .field("addr", &self.inner.options.addr())
            .field("db", &self.inner.options.db)
            .field("status", &self.status())
            .finish()
    }
}
