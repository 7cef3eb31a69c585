//! Client options and URL parsing.
//!
//! Supports `redis://[user:pass@]host[:port][/db]` and `rediss://…`
//! (parsed, but TLS connections are refused by the native driver).

use std::time::Duration;

use crate::error::{Error, Result};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Environment variable read by [`RedisOptions::from_env`].
pub const URL_ENV_VAR: &str = "REDIS_URL";

/// Construction options for [`crate::client::Redis`] and the native driver.
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    /// Optional username (Redis 6+ ACL).
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database index selected on every new connection.
    pub db: u16,
    pub tls: bool,
    /// Defer connecting until the first command is issued.
    pub lazy_connect: bool,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-command deadline in milliseconds (0 = none).
    pub command_timeout_ms: u64,
    /// Extra connect attempts after the first failure.
    pub max_retries: u32,
    /// Base delay between connect attempts; doubles per attempt.
    pub retry_delay_ms: u64,
    /// Shared command path pool size.
    pub pool_size: usize,
    /// Idle connections older than this are dropped.
    pub idle_timeout_ms: u64,
    /// Maximum read buffer size per connection in bytes.
    pub max_buffer_size: usize,
    /// Bounded wait of one subscriber poll.
    pub poll_interval_ms: u64,
    /// Extra settle delay after a subscription is acknowledged.
    pub subscribe_settle_ms: u64,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            tls: false,
            lazy_connect: false,
            connect_timeout_ms: 10_000,
            command_timeout_ms: 0,
            max_retries: 3,
            retry_delay_ms: 50,
            pool_size: 8,
            idle_timeout_ms: 300_000, // 5 minutes
            max_buffer_size: crate::connection::tcp::DEFAULT_MAX_BUF_SIZE,
            poll_interval_ms: 100,
            subscribe_settle_ms: 0,
        }
    }
}

impl RedisOptions {
    /// Parse a Redis URL on top of the defaults.
    pub fn from_url(url: &str) -> Result<Self> {
        let mut options = Self::default();

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::Usage(format!("invalid URL, missing ://: {url}")))?;

        match scheme {
            "redis" => {}
            "rediss" => options.tls = true,
            _ => return Err(Error::Usage(format!("unknown URL scheme: {scheme}"))),
        }

        let (host_part, db_part) = split_path(rest);
        if let Some(db_str) = db_part {
            options.db = db_str
                .parse()
                .map_err(|_| Error::Usage(format!("invalid db number: {db_str}")))?;
        }

        let host_port = match host_part.rsplit_once('@') {
            Some((userinfo, hp)) => {
                parse_userinfo(&mut options, userinfo);
                hp
            }
            None => host_part,
        };
        let (host, port) = parse_host_port(host_port)?;
        options.host = host;
        options.port = port;
        Ok(options)
    }

    /// Read `REDIS_URL`, falling back to the defaults when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(URL_ENV_VAR) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn with_lazy_connect(mut self, lazy: bool) -> Self {
        self.lazy_connect = lazy;
        self
    }

    pub fn with_db(mut self, db: u16) -> Self {
        self.db = db;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reject option combinations nothing downstream can honour.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Usage("pool_size must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Usage("poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Return the primary address as "host:port".
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when commands have no deadline.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (before_path, Some(path)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// `user:pass`, `:pass`, or a bare password.
fn parse_userinfo(options: &mut RedisOptions, userinfo: &str) {
    match userinfo.split_once(':') {
        Some((user, pass)) => {
            if !user.is_empty() {
                options.username = Some(user.to_string());
            }
            if !pass.is_empty() {
                options.password = Some(pass.to_string());
            }
        }
        None if !userinfo.is_empty() => options.password = Some(userinfo.to_string()),
        None => {}
    }
}

/// `host[:port]` or `[ipv6]:port`.
fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(inner) = s.strip_prefix('[') {
        let (host, after) = inner
            .split_once(']')
            .ok_or_else(|| Error::Usage(format!("unclosed IPv6 bracket: {s}")))?;
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| Error::Usage(format!("invalid port: {p}")))?,
            None => DEFAULT_PORT,
        };
        (host.to_string(), port)
    } else if let Some((h, p)) = s.rsplit_once(':') {
        match p.parse::<u16>() {
            Ok(port) => (h.to_string(), port),
            // bare IPv6 without brackets
            Err(_) if h.contains(':') => (s.to_string(), DEFAULT_PORT),
            Err(_) => return Err(Error::Usage(format!("invalid port: {p}"))),
        }
    } else {
        (s.to_string(), DEFAULT_PORT)
    };

    if host.is_empty() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    Ok((host, port))
}

// ── Tests ──────────────────────────────────────────────────────────
