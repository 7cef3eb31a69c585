//! Shared helpers for integration tests.
//!
//! `MemoryDriver` is an in-process store speaking the driver traits: strings,
//! hashes and sorted sets, MULTI/EXEC with WATCH versions, and pub/sub with
//! glob patterns. Tests run without a server.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use rsedis_compat::{
    Connection, Driver, Error, Event, EventKind, RawMessage, Redis, RedisOptions, RespValue,
    Result, Subscription,
};

const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";

#[derive(Default)]
struct Store {
    strings: HashMap<String, String>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    versions: HashMap<String, u64>,
}

impl Store {
    fn touch(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_default() += 1;
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn exists(&self, key: &str) -> bool {
        self.strings.contains_key(key) || self.hashes.contains_key(key) || self.zsets.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.strings.remove(key).is_some()
            | self.hashes.remove(key).is_some()
            | self.zsets.remove(key).is_some();
        if removed {
            self.touch(key);
        }
        removed
    }
}

fn known(name: &str) -> bool {
    matches!(
        name,
        "PING" | "GET" | "SET" | "INCR" | "DEL" | "EXISTS" | "HSET" | "HGET" | "HGETALL" | "ZADD"
            | "ZRANGE" | "ZSCORE"
    )
}

fn wrong_args(name: &str) -> RespValue {
    RespValue::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}

fn score_text(score: f64) -> String {
    score.to_string()
}

/// Run one data command against the store.
fn apply(store: &mut Store, args: &[String]) -> RespValue {
    let Some((name, rest)) = args.split_first() else {
        return RespValue::Error("ERR empty command".into());
    };
    let name = name.to_uppercase();
    match (name.as_str(), rest) {
        ("PING", []) => RespValue::status("PONG"),
        ("GET", [key]) => match store.strings.get(key) {
            Some(v) => RespValue::bulk(v.clone()),
            None => RespValue::Null,
        },
        ("SET", [key, value, ..]) => {
            store.strings.insert(key.clone(), value.clone());
            store.touch(key);
            RespValue::status("OK")
        }
        ("INCR", [key]) => {
            let current = store.strings.get(key).map(String::as_str).unwrap_or("0");
            match current.parse::<i64>() {
                Ok(n) => {
                    store.strings.insert(key.clone(), (n + 1).to_string());
                    store.touch(key);
                    RespValue::Integer(n + 1)
                }
                Err(_) => RespValue::Error(NOT_AN_INTEGER.into()),
            }
        }
        ("DEL", keys) if !keys.is_empty() => {
            RespValue::Integer(keys.iter().filter(|k| store.remove(k)).count() as i64)
        }
        ("EXISTS", keys) if !keys.is_empty() => {
            RespValue::Integer(keys.iter().filter(|k| store.exists(k)).count() as i64)
        }
        ("HSET", [key, fields @ ..]) if !fields.is_empty() && fields.len() % 2 == 0 => {
            let hash = store.hashes.entry(key.clone()).or_default();
            let mut added = 0;
            for pair in fields.chunks(2) {
                if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            store.touch(key);
            RespValue::Integer(added)
        }
        ("HGET", [key, field]) => match store.hashes.get(key).and_then(|h| h.get(field)) {
            Some(v) => RespValue::bulk(v.clone()),
            None => RespValue::Null,
        },
        ("HGETALL", [key]) => RespValue::Array(
            store
                .hashes
                .get(key)
                .map(|h| {
                    h.iter()
                        .flat_map(|(f, v)| [RespValue::bulk(f.clone()), RespValue::bulk(v.clone())])
                        .collect()
                })
                .unwrap_or_default(),
        ),
        ("ZADD", [key, entries @ ..]) if !entries.is_empty() && entries.len() % 2 == 0 => {
            let mut parsed = Vec::with_capacity(entries.len() / 2);
            for pair in entries.chunks(2) {
                match pair[0].parse::<f64>() {
                    Ok(score) => parsed.push((pair[1].clone(), score)),
                    Err(_) => return RespValue::Error("ERR value is not a valid float".into()),
                }
            }
            let zset = store.zsets.entry(key.clone()).or_default();
            let mut added = 0;
            for (member, score) in parsed {
                match zset.iter_mut().find(|(m, _)| *m == member) {
                    Some(entry) => entry.1 = score,
                    None => {
                        zset.push((member, score));
                        added += 1;
                    }
                }
            }
            zset.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            store.touch(key);
            RespValue::Integer(added)
        }
        ("ZRANGE", [key, start, stop, flags @ ..]) => {
            let (Ok(start), Ok(stop)) = (start.parse::<i64>(), stop.parse::<i64>()) else {
                return RespValue::Error(NOT_AN_INTEGER.into());
            };
            let with_scores = flags.iter().any(|f| f.eq_ignore_ascii_case("WITHSCORES"));
            let zset = store.zsets.get(key).cloned().unwrap_or_default();
            let len = zset.len() as i64;
            let start = if start < 0 { (len + start).max(0) } else { start };
            let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
            let mut out = Vec::new();
            if start <= stop {
                for (member, score) in &zset[start as usize..=stop as usize] {
                    out.push(RespValue::bulk(member.clone()));
                    if with_scores {
                        out.push(RespValue::bulk(score_text(*score)));
                    }
                }
            }
            RespValue::Array(out)
        }
        ("ZSCORE", [key, member]) => match store
            .zsets
            .get(key)
            .and_then(|z| z.iter().find(|(m, _)| m == member))
        {
            Some((_, score)) => RespValue::bulk(score_text(*score)),
            None => RespValue::Null,
        },
        (name, _) if known(name) => wrong_args(name),
        (_, _) => RespValue::Error(format!("ERR unknown command '{}'", args[0])),
    }
}

/// Glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some(b'?'), Some(_)) => go(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a == b => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), text.as_bytes())
}

struct Slot {
    id: u64,
    channels: Vec<String>,
    patterns: Vec<String>,
    tx: mpsc::UnboundedSender<RawMessage>,
}

#[derive(Default)]
struct Shared {
    store: Mutex<Store>,
    subscribers: Mutex<Vec<Slot>>,
    next_sub: AtomicU64,
    connected: AtomicBool,
    connects: AtomicU32,
    failing_connects: AtomicU32,
    connect_delay: Mutex<Duration>,
    subscribes: AtomicU32,
    failing_subscribes: AtomicU32,
    subscribe_delay: Mutex<Duration>,
    corrupt_next_read: AtomicBool,
    batches: Mutex<Vec<Vec<Vec<String>>>>,
}

impl Shared {
    fn check_open(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn publish(&self, channel: &str, message: &str) -> i64 {
        let subscribers = self.subscribers.lock();
        let mut receivers = 0;
        for slot in subscribers.iter() {
            if slot.channels.iter().any(|c| c == channel) {
                let msg = RawMessage::exact(channel.to_string(), message.to_string());
                if slot.tx.send(msg).is_ok() {
                    receivers += 1;
                }
            }
            for pattern in slot.patterns.iter().filter(|p| glob_match(p, channel)) {
                let msg = RawMessage::pattern(pattern.clone(), channel.to_string(), message.to_string());
                if slot.tx.send(msg).is_ok() {
                    receivers += 1;
                }
            }
        }
        receivers
    }

    fn command(&self, args: &[String]) -> RespValue {
        match args {
            [name, channel, message] if name.eq_ignore_ascii_case("PUBLISH") => {
                RespValue::Integer(self.publish(channel, message))
            }
            _ => apply(&mut self.store.lock(), args),
        }
    }

    /// Run a batch the way a server would, emulating MULTI/EXEC. `watched`
    /// holds the key versions seen at WATCH time.
    fn batch(&self, commands: &[Vec<String>], watched: &HashMap<String, u64>) -> Vec<RespValue> {
        self.batches.lock().push(commands.to_vec());
        let mut replies = Vec::with_capacity(commands.len());
        let mut queue: Option<Vec<Vec<String>>> = None;
        let mut poisoned = false;

        for args in commands {
            let name = args.first().map(|n| n.to_uppercase()).unwrap_or_default();
            match (name.as_str(), queue.is_some()) {
                ("MULTI", false) => {
                    queue = Some(Vec::new());
                    poisoned = false;
                    replies.push(RespValue::status("OK"));
                }
                ("EXEC", true) => {
                    let queued = queue.take().unwrap_or_default();
                    replies.push(self.exec(queued, poisoned, watched));
                }
                (name, true) => {
                    if known(name) || name == "PUBLISH" {
                        if let Some(queued) = queue.as_mut() {
                            queued.push(args.clone());
                        }
                        replies.push(RespValue::status("QUEUED"));
                    } else {
                        poisoned = true;
                        replies.push(RespValue::Error(format!("ERR unknown command '{}'", args[0])));
                    }
                }
                (_, false) => replies.push(self.command(args)),
            }
        }
        replies
    }

    fn exec(&self, queued: Vec<Vec<String>>, poisoned: bool, watched: &HashMap<String, u64>) -> RespValue {
        if poisoned {
            return RespValue::Error("EXECABORT Transaction discarded because of previous errors.".into());
        }
        {
            let store = self.store.lock();
            if watched.iter().any(|(key, seen)| store.version(key) != *seen) {
                return RespValue::Null;
            }
        }
        RespValue::Array(queued.iter().map(|args| self.command(args)).collect())
    }
}

/// In-memory driver. Clones share one store.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` connect attempts fail with a refused connection.
    pub fn fail_connects(&self, n: u32) {
        self.shared.failing_connects.store(n, Ordering::Release);
    }

    pub fn delay_connect(&self, delay: Duration) {
        *self.shared.connect_delay.lock() = delay;
    }

    /// The next `n` subscriber opens fail with a refused connection.
    pub fn fail_subscribes(&self, n: u32) {
        self.shared.failing_subscribes.store(n, Ordering::Release);
    }

    /// Opening a subscriber takes `delay` before it can be confirmed.
    pub fn delay_subscribes(&self, delay: Duration) {
        *self.shared.subscribe_delay.lock() = delay;
    }

    pub fn subscribe_attempts(&self) -> u32 {
        self.shared.subscribes.load(Ordering::Acquire)
    }

    /// The next subscriber read hits an unparseable frame; that subscriber
    /// keeps failing with a protocol error from then on.
    pub fn corrupt_next_read(&self) {
        self.shared.corrupt_next_read.store(true, Ordering::Release);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.shared.connects.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Every batch sent so far, in order.
    pub fn batches(&self) -> Vec<Vec<Vec<String>>> {
        self.shared.batches.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Publish from outside the client.
    pub fn publish(&self, channel: &str, message: &str) -> i64 {
        self.shared.publish(channel, message)
    }

    /// Write a string directly, bumping its version.
    pub fn put(&self, key: &str, value: &str) {
        let mut store = self.shared.store.lock();
        store.strings.insert(key.to_string(), value.to_string());
        store.touch(key);
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.shared.store.lock().strings.get(key).cloned()
    }
}

impl Driver for MemoryDriver {
    type Connection = MemoryConnection;
    type Subscription = MemorySubscription;

    async fn connect(&self) -> Result<()> {
        self.shared.connects.fetch_add(1, Ordering::AcqRel);
        let delay = *self.shared.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self.shared.failing_connects.load(Ordering::Acquire);
        if failing > 0 {
            self.shared.failing_connects.store(failing - 1, Ordering::Release);
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<RespValue> {
        self.shared.check_open()?;
        Ok(self.shared.command(args))
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<Result<RespValue>>> {
        self.shared.check_open()?;
        Ok(self.shared.batch(commands, &HashMap::new()).into_iter().map(Ok).collect())
    }

    async fn dedicated(&self) -> Result<MemoryConnection> {
        self.shared.check_open()?;
        Ok(MemoryConnection {
            shared: self.shared.clone(),
            watched: HashMap::new(),
        })
    }

    async fn subscribe(&self, channels: &[String], patterns: &[String]) -> Result<MemorySubscription> {
        self.shared.check_open()?;
        self.shared.subscribes.fetch_add(1, Ordering::AcqRel);
        let delay = *self.shared.subscribe_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failing = self.shared.failing_subscribes.load(Ordering::Acquire);
        if failing > 0 {
            self.shared.failing_subscribes.store(failing - 1, Ordering::Release);
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(MemorySubscription {
            shared: self.shared.clone(),
            id: self.shared.next_sub.fetch_add(1, Ordering::AcqRel),
            channels: channels.to_vec(),
            patterns: patterns.to_vec(),
            tx: Some(tx),
            rx,
            broken: false,
        })
    }

    fn shutdown(&self) {
        self.shared.connected.store(false, Ordering::Release);
    }
}

pub struct MemoryConnection {
    shared: Arc<Shared>,
    watched: HashMap<String, u64>,
}

impl Connection for MemoryConnection {
    async fn execute(&mut self, args: &[String]) -> Result<RespValue> {
        self.shared.check_open()?;
        let name = args.first().map(|n| n.to_uppercase()).unwrap_or_default();
        match name.as_str() {
            "WATCH" => {
                let store = self.shared.store.lock();
                for key in &args[1..] {
                    self.watched.insert(key.clone(), store.version(key));
                }
                Ok(RespValue::status("OK"))
            }
            "UNWATCH" => {
                self.watched.clear();
                Ok(RespValue::status("OK"))
            }
            _ => Ok(self.shared.command(args)),
        }
    }

    async fn pipeline(&mut self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        self.shared.check_open()?;
        let replies = self.shared.batch(commands, &self.watched);
        if commands.iter().any(|c| c.first().is_some_and(|n| n.eq_ignore_ascii_case("EXEC"))) {
            self.watched.clear();
        }
        Ok(replies)
    }
}

pub struct MemorySubscription {
    shared: Arc<Shared>,
    id: u64,
    channels: Vec<String>,
    patterns: Vec<String>,
    tx: Option<mpsc::UnboundedSender<RawMessage>>,
    rx: mpsc::UnboundedReceiver<RawMessage>,
    broken: bool,
}

impl Subscription for MemorySubscription {
    async fn confirm(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.shared.subscribers.lock().push(Slot {
                id: self.id,
                channels: self.channels.clone(),
                patterns: self.patterns.clone(),
                tx,
            });
        }
        Ok(())
    }

    async fn next_message(&mut self, wait: Duration) -> Result<Option<RawMessage>> {
        if self.shared.corrupt_next_read.swap(false, Ordering::AcqRel) {
            self.broken = true;
        }
        if self.broken {
            return Err(Error::Protocol("unknown RESP type byte: 0x3f".into()));
        }
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(Error::Closed),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.shared.subscribers.lock().retain(|slot| slot.id != self.id);
    }
}

/// Options tuned for fast tests.
pub fn test_options() -> RedisOptions {
    RedisOptions {
        max_retries: 0,
        retry_delay_ms: 1,
        poll_interval_ms: 10,
        connect_timeout_ms: 1_000,
        ..RedisOptions::default()
    }
}

/// A connected client over a fresh store.
pub async fn connected() -> Redis<MemoryDriver> {
    Redis::open(MemoryDriver::new(), test_options())
        .await
        .expect("connect to memory driver")
}

/// Record every event of `kinds`.
pub fn record(redis: &Redis<MemoryDriver>, kinds: &[EventKind]) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for &kind in kinds {
        let sink = seen.clone();
        redis.on(kind, move |event| sink.lock().push(event.clone()));
    }
    seen
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn bytes(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}
