//! Driver backed by this crate's own RESP connections.
//!
//! Shared commands go through the connection pool; exclusive and
//! subscriber connections are opened beside it with the same handshake.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::RedisOptions;
use crate::connection::pool::ConnectionPool;
use crate::connection::tcp::RedisConnection;
use crate::driver::{Connection, Driver, RawMessage, Subscription};
use crate::error::{Error, Result};
use crate::resp::types::RespValue;
use crate::resp::writer::encode_pipeline;

/// Driver for a single Redis server.
pub struct NativeDriver {
    options: RedisOptions,
    pool: RwLock<Arc<ConnectionPool>>,
}

impl NativeDriver {
    pub fn new(options: RedisOptions) -> Self {
        let pool = Arc::new(ConnectionPool::new(options.clone()));
        Self {
            options,
            pool: RwLock::new(pool),
        }
    }

    pub fn options(&self) -> &RedisOptions {
        &self.options
    }

    /// Number of idle pooled connections.
    pub fn pool_idle_count(&self) -> usize {
        self.pool().idle_count()
    }

    /// Number of free pool slots.
    pub fn pool_available(&self) -> usize {
        self.pool().available()
    }

    fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.read().clone()
    }

    /// A closed pool cannot reopen, so reconnecting swaps in a fresh one.
    fn reopen(&self) -> Arc<ConnectionPool> {
        let mut pool = self.pool.write();
        if pool.is_closed() {
            *pool = Arc::new(ConnectionPool::new(self.options.clone()));
        }
        pool.clone()
    }
}

impl Driver for NativeDriver {
    type Connection = NativeConnection;
    type Subscription = NativeSubscription;

    async fn connect(&self) -> Result<()> {
        let pool = self.reopen();
        // opening one connection runs AUTH / SELECT; it goes back idle
        let _guard = pool.get().await?;
        debug!(addr = %self.options.addr(), "shared command path ready");
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<RespValue> {
        let pool = self.pool();
        let mut guard = pool.get().await?;
        let mut conn = guard.take()?;
        let reply = conn.execute(args).await?;
        guard.restore(conn);
        Ok(reply)
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<Result<RespValue>>> {
        let pool = self.pool();
        let mut guard = pool.get().await?;
        let mut conn = guard.take()?;
        let replies = conn.pipeline(commands).await?;
        guard.restore(conn);
        Ok(replies.into_iter().map(Ok).collect())
    }

    async fn dedicated(&self) -> Result<NativeConnection> {
        let conn = self.pool().open().await?;
        Ok(NativeConnection { conn })
    }

    async fn subscribe(&self, channels: &[String], patterns: &[String]) -> Result<NativeSubscription> {
        let conn = self.pool().open().await?;
        NativeSubscription::start(conn, channels, patterns, self.options.connect_timeout()).await
    }

    fn shutdown(&self) {
        self.pool().close();
    }
}

/// An exclusive connection outside the pool.
pub struct NativeConnection {
    conn: RedisConnection,
}

impl Connection for NativeConnection {
    async fn execute(&mut self, args: &[String]) -> Result<RespValue> {
        self.conn.execute(args).await
    }

    async fn pipeline(&mut self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        self.conn.pipeline(commands).await
    }
}

// ── Subscriber ─────────────────────────────────────────────────────

/// A connection in subscriber mode.
///
/// SUBSCRIBE / PSUBSCRIBE are written at construction; deliveries that
/// arrive while acknowledgements are still being read are kept in order.
///
/// An unparseable frame leaves the stream out of sync, so from then on
/// every read fails with a connection error and the subscriber has to be
/// reopened.
pub struct NativeSubscription {
    conn: RedisConnection,
    pending: VecDeque<RawMessage>,
    expected_acks: usize,
    acked: usize,
    ack_timeout: Duration,
    broken: bool,
}

impl NativeSubscription {
    async fn start(
        mut conn: RedisConnection,
        channels: &[String],
        patterns: &[String],
        ack_timeout: Duration,
    ) -> Result<Self> {
        let mut commands = Vec::with_capacity(2);
        if !channels.is_empty() {
            commands.push(prefixed("SUBSCRIBE", channels));
        }
        if !patterns.is_empty() {
            commands.push(prefixed("PSUBSCRIBE", patterns));
        }
        if commands.is_empty() {
            return Err(Error::Usage("a subscription needs at least one channel or pattern".into()));
        }
        conn.send_raw(&encode_pipeline(&commands)).await?;
        debug!(channels = channels.len(), patterns = patterns.len(), "subscriber connection opened");

        Ok(Self {
            conn,
            pending: VecDeque::new(),
            expected_acks: channels.len() + patterns.len(),
            acked: 0,
            ack_timeout,
            broken: false,
        })
    }

    async fn read_within(&mut self, wait: Duration) -> Result<Option<RespValue>> {
        if self.broken {
            return Err(desynced("subscriber stream is out of sync"));
        }
        match self.conn.read_response_within(wait).await {
            Err(Error::Protocol(msg)) => {
                self.broken = true;
                debug!(error = %msg, "subscriber stream desynced");
                Err(desynced(&msg))
            }
            other => other,
        }
    }
}

fn desynced(msg: &str) -> Error {
    Error::Connection(io::Error::new(io::ErrorKind::InvalidData, msg.to_string()))
}

impl Subscription for NativeSubscription {
    async fn confirm(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.ack_timeout;
        while self.acked < self.expected_acks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = self.read_within(remaining).await?.ok_or_else(|| {
                Error::Timeout(format!(
                    "subscription not acknowledged within {:?}",
                    self.ack_timeout
                ))
            })?;
            match classify(frame)? {
                Frame::Ack => self.acked += 1,
                Frame::Delivery(msg) => self.pending.push_back(msg),
                Frame::Other => {}
            }
        }
        Ok(())
    }

    async fn next_message(&mut self, wait: Duration) -> Result<Option<RawMessage>> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(frame) = self.read_within(remaining).await? else {
                return Ok(None);
            };
            match classify(frame)? {
                Frame::Delivery(msg) => return Ok(Some(msg)),
                Frame::Ack => self.acked += 1,
                Frame::Other => {}
            }
        }
    }
}

fn prefixed(command: &str, names: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(names.len() + 1);
    args.push(command.to_string());
    args.extend(names.iter().cloned());
    args
}

enum Frame {
    Ack,
    Delivery(RawMessage),
    Other,
}

/// Sort a subscriber-mode frame. RESP2 sends arrays, RESP3 push frames;
/// both carry the kind as their first element.
fn classify(frame: RespValue) -> Result<Frame> {
    if let Some(msg) = frame.error_message() {
        return Err(Error::redis(msg));
    }
    let Some(items) = frame.into_items() else {
        return Ok(Frame::Other);
    };
    let kind = items
        .first()
        .and_then(RespValue::as_str)
        .map(str::to_ascii_lowercase);

    match (kind.as_deref(), &items[..]) {
        (Some("message"), [_, channel, payload]) => Ok(Frame::Delivery(RawMessage {
            pattern: None,
            channel: field(channel)?,
            payload: field(payload)?,
        })),
        (Some("pmessage"), [_, pattern, channel, payload]) => Ok(Frame::Delivery(RawMessage {
            pattern: Some(field(pattern)?),
            channel: field(channel)?,
            payload: field(payload)?,
        })),
        (Some("subscribe" | "psubscribe"), _) => Ok(Frame::Ack),
        _ => Ok(Frame::Other),
    }
}

fn field(value: &RespValue) -> Result<Bytes> {
    match value {
        RespValue::BulkString(b) => Ok(b.clone()),
        RespValue::SimpleString(s) | RespValue::Verbatim(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        RespValue::Integer(i) => Ok(Bytes::from(i.to_string())),
        other => Err(Error::Protocol(format!(
            "unexpected {} in pub/sub frame",
            other.type_name()
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
