//! Async TCP connection to a Redis server.
//!
//! Wraps a `tokio::net::TcpStream` with an integrated read buffer and the
//! RESP parser. Reads are cancellation-safe: a read abandoned by a timeout
//! leaves any partial frame in the buffer for the next call.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::resp::writer::{encode_command, encode_pipeline};

/// Initial read buffer capacity (64 KB).
const DEFAULT_BUF_CAPACITY: usize = 64 * 1024;

/// Default maximum read buffer size (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// A single async connection to a Redis server.
pub struct RedisConnection {
    stream: TcpStream,
    /// Bytes read from the socket but not yet consumed by the parser.
    buf: BytesMut,
    max_buf_size: usize,
    /// Timestamp of last successful I/O (for idle checks).
    pub last_used: Instant,
}

impl RedisConnection {
    /// Connect to `addr` (e.g. "127.0.0.1:6379").
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_max_buf(addr, DEFAULT_MAX_BUF_SIZE).await
    }

    pub async fn connect_with_max_buf(addr: &str, max_buf_size: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        debug!(addr, "tcp connection established");
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            max_buf_size,
            last_used: Instant::now(),
        })
    }

    /// Connect, giving up after `timeout`.
    pub async fn connect_timeout(addr: &str, timeout: Duration, max_buf_size: usize) -> Result<Self> {
        match tokio::time::timeout(timeout, Self::connect_with_max_buf(addr, max_buf_size)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "connection to {addr} timed out after {timeout:?}"
            ))),
        }
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Read and parse one complete RESP value.
    pub async fn read_response(&mut self) -> Result<RespValue> {
        loop {
            if let Some(value) = self.try_parse()? {
                self.last_used = Instant::now();
                return Ok(value);
            }
            self.fill_buf().await?;
        }
    }

    /// Like [`read_response`](Self::read_response) but returns `Ok(None)`
    /// when nothing complete arrives within `wait`.
    pub async fn read_response_within(&mut self, wait: Duration) -> Result<Option<RespValue>> {
        match tokio::time::timeout(wait, self.read_response()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Parse a frame from buffered bytes only. No await point, so the
    /// buffer is never left half-consumed.
    fn try_parse(&mut self) -> Result<Option<RespValue>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let snapshot = self.buf.split().freeze();
        match parse(&snapshot) {
            Ok((value, consumed)) => {
                if consumed < snapshot.len() {
                    self.buf.extend_from_slice(&snapshot[consumed..]);
                }
                Ok(Some(value))
            }
            Err(Error::Incomplete) => {
                self.buf.extend_from_slice(&snapshot);
                Ok(None)
            }
            Err(e) => {
                self.buf.extend_from_slice(&snapshot);
                Err(e)
            }
        }
    }

    async fn fill_buf(&mut self) -> Result<()> {
        if self.buf.capacity() - self.buf.len() < 4096 {
            let wanted = (self.buf.capacity() * 2).max(DEFAULT_BUF_CAPACITY);
            if self.buf.capacity() >= self.max_buf_size {
                return Err(Error::Protocol(format!(
                    "RESP message too large: buffer would exceed {} bytes",
                    self.max_buf_size
                )));
            }
            let target = wanted.min(self.max_buf_size);
            self.buf.reserve(target - self.buf.len());
        }
        let n = self.stream.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        Ok(())
    }

    /// Send one command and read its reply.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue> {
        let cmd = encode_command(args);
        self.send_raw(&cmd).await?;
        self.read_response().await
    }

    /// Send every command in one write, then read one reply per command.
    pub async fn pipeline<A: AsRef<[u8]>>(&mut self, commands: &[Vec<A>]) -> Result<Vec<RespValue>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let buf = encode_pipeline(commands);
        self.send_raw(&buf).await?;
        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_response().await?);
        }
        Ok(replies)
    }

    /// AUTH with optional ACL username.
    pub async fn auth(&mut self, username: Option<&str>, password: &str) -> Result<()> {
        let response = match username {
            Some(user) => self.execute(&["AUTH", user, password]).await?,
            None => self.execute(&["AUTH", password]).await?,
        };
        expect_ok(response, "AUTH")
    }

    /// SELECT a database; db 0 is the server default and skipped.
    pub async fn select_db(&mut self, db: u16) -> Result<()> {
        if db == 0 {
            return Ok(());
        }
        let db_str = db.to_string();
        let response = self.execute(&["SELECT", db_str.as_str()]).await?;
        expect_ok(response, "SELECT")
    }

    pub async fn ping(&mut self) -> Result<bool> {
        let response = self.execute(&["PING"]).await?;
        Ok(matches!(response, RespValue::SimpleString(ref s) if s == "PONG"))
    }

    /// Post-connect handshake: AUTH (when configured) then SELECT.
    pub async fn init(&mut self, username: Option<&str>, password: Option<&str>, db: u16) -> Result<()> {
        if let Some(pass) = password {
            self.auth(username, pass).await?;
        }
        self.select_db(db).await
    }
}

fn expect_ok(response: RespValue, what: &str) -> Result<()> {
    match response {
        r if r.is_ok() => Ok(()),
        RespValue::Error(msg) | RespValue::BulkError(msg) => Err(Error::redis(msg)),
        other => Err(Error::Protocol(format!(
            "unexpected {what} response: {}",
            other.type_name()
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
