//! Async connection pool for the shared command path.
//!
//! A semaphore bounds checked-out connections and a deque keeps idle ones
//! for reuse. The idle queue sits behind a `parking_lot::Mutex` (held very
//! briefly) so connections can be returned from `Drop` without async.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use crate::config::RedisOptions;
use crate::connection::tcp::RedisConnection;
use crate::error::{Error, Result};

pub struct ConnectionPool {
    idle: SyncMutex<VecDeque<RedisConnection>>,
    semaphore: Semaphore,
    options: RedisOptions,
    max_size: usize,
    idle_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(options: RedisOptions) -> Self {
        let max_size = options.pool_size.max(1);
        let idle_timeout = Duration::from_millis(options.idle_timeout_ms);
        Self {
            idle: SyncMutex::new(VecDeque::with_capacity(max_size)),
            semaphore: Semaphore::new(max_size),
            options,
            max_size,
            idle_timeout,
        }
    }

    /// Check out a connection, opening a new one when none is idle.
    ///
    /// Fails with [`Error::Closed`] once [`close`](Self::close) has run.
    pub async fn get(&self) -> Result<PoolGuard<'_>> {
        let permit = self.semaphore.acquire().await.map_err(|_| Error::Closed)?;

        let conn = {
            let mut idle = self.idle.lock();
            self.take_healthy_connection(&mut idle)
        };
        let conn = match conn {
            Some(c) => c,
            None => self.open().await?,
        };

        Ok(PoolGuard {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    /// Open a connection outside the pool's accounting, fully initialised.
    pub async fn open(&self) -> Result<RedisConnection> {
        if self.options.tls {
            return Err(Error::Usage(
                "TLS connections (rediss://) are not supported; use redis://".into(),
            ));
        }
        if self.semaphore.is_closed() {
            return Err(Error::Closed);
        }

        let addr = self.options.addr();
        let mut conn = RedisConnection::connect_timeout(
            &addr,
            self.options.connect_timeout(),
            self.options.max_buffer_size,
        )
        .await?;
        conn.init(
            self.options.username.as_deref(),
            self.options.password.as_deref(),
            self.options.db,
        )
        .await?;
        debug!(addr = %addr, db = self.options.db, "connection initialised");
        Ok(conn)
    }

    /// Stop handing out connections and drop the idle ones.
    pub fn close(&self) {
        self.semaphore.close();
        self.idle.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Roughly `max_size - checked_out`.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// LIFO for cache warmth; stale connections are dropped on the way.
    fn take_healthy_connection(&self, idle: &mut VecDeque<RedisConnection>) -> Option<RedisConnection> {
        while let Some(conn) = idle.pop_back() {
            if conn.last_used.elapsed() <= self.idle_timeout {
                return Some(conn);
            }
        }
        None
    }

    fn return_connection(&self, conn: RedisConnection) {
        if self.is_closed() || conn.last_used.elapsed() > self.idle_timeout {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_size {
            idle.push_back(conn);
        }
    }
}

/// RAII guard that returns the connection to the pool on drop.
pub struct PoolGuard<'a> {
    conn: Option<RedisConnection>,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PoolGuard<'_> {
    /// The checked-out connection.
    pub fn conn(&mut self) -> Result<&mut RedisConnection> {
        self.conn.as_mut().ok_or(Error::Closed)
    }

    /// Discard the connection instead of returning it (after an I/O error
    /// its read buffer can no longer be trusted).
    pub fn poison(&mut self) {
        self.conn = None;
    }

    /// Detach the connection for one request/reply exchange. A guard
    /// dropped before [`restore`](Self::restore) discards it, so a
    /// cancelled exchange never leaves an unread reply in the pool.
    pub fn take(&mut self) -> Result<RedisConnection> {
        self.conn.take().ok_or(Error::Closed)
    }

    pub fn restore(&mut self, conn: RedisConnection) {
        self.conn = Some(conn);
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
