//! Pub/sub bridge.
//!
//! The driver fixes a subscriber's channel and pattern sets when it is
//! opened, so every change to the desired sets opens a new subscriber,
//! waits for the server to acknowledge it, starts polling it and only then
//! stops the previous one. There is always a live subscriber while any
//! subscription exists; messages published during the swap may be
//! delivered by both.
//!
//! Deliveries are polled with a bounded wait on a background task and
//! emitted synchronously through the client's [`Emitter`].

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{Connection, Driver, RawMessage, Subscription};
use crate::error::{Error, Result};
use crate::events::{Emitter, Event};
use crate::retry::{with_retry, RetryPolicy};
use crate::translate::translate_error;

/// First pause after a failed poll; doubles per consecutive failure.
const POLL_BACKOFF: Duration = Duration::from_millis(50);

/// Exact-channel or pattern subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Channel,
    Pattern,
}

impl Scope {
    fn command(self) -> &'static str {
        match self {
            Self::Channel => "subscribe",
            Self::Pattern => "psubscribe",
        }
    }

    fn added(self, name: String, count: usize) -> Event {
        match self {
            Self::Channel => Event::Subscribe { channel: name, count },
            Self::Pattern => Event::PSubscribe { pattern: name, count },
        }
    }

    fn removed(self, name: String, count: usize) -> Event {
        match self {
            Self::Channel => Event::Unsubscribe { channel: name, count },
            Self::Pattern => Event::PUnsubscribe { pattern: name, count },
        }
    }
}

#[derive(Default)]
struct BridgeState {
    channels: BTreeSet<String>,
    patterns: BTreeSet<String>,
    listener: Option<Listener>,
}

impl BridgeState {
    fn set(&self, scope: Scope) -> &BTreeSet<String> {
        match scope {
            Scope::Channel => &self.channels,
            Scope::Pattern => &self.patterns,
        }
    }

    /// Channel and pattern sets with `scope` replaced by `desired`.
    fn with(&self, scope: Scope, desired: BTreeSet<String>) -> (BTreeSet<String>, BTreeSet<String>) {
        match scope {
            Scope::Channel => (desired, self.patterns.clone()),
            Scope::Pattern => (self.channels.clone(), desired),
        }
    }
}

/// A running poll task over one subscriber.
struct Listener {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Listener {
    fn spawn<D: Driver>(
        driver: Arc<D>,
        sub: D::Subscription,
        channels: Vec<String>,
        patterns: Vec<String>,
        events: Arc<Emitter>,
        wait: Duration,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(poll_loop(
            driver,
            sub,
            channels,
            patterns,
            alive.clone(),
            events,
            wait,
        ));
        Self { alive, task }
    }

    /// Observed by the loop within one poll interval.
    async fn stop(self) {
        self.alive.store(false, Ordering::Release);
        if let Err(e) = self.task.await {
            warn!(error = %e, "subscriber poll task ended abnormally");
        }
    }
}

/// Subscription state plus the subscriber and publisher connections.
pub struct PubSubBridge<D: Driver> {
    driver: Arc<D>,
    events: Arc<Emitter>,
    state: AsyncMutex<BridgeState>,
    publisher: AsyncMutex<Option<D::Connection>>,
    poll_interval: Duration,
    settle: Duration,
    rebuild_policy: RetryPolicy,
}

impl<D: Driver> PubSubBridge<D> {
    pub fn new(
        driver: Arc<D>,
        events: Arc<Emitter>,
        poll_interval: Duration,
        settle: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            driver,
            events,
            state: AsyncMutex::new(BridgeState::default()),
            publisher: AsyncMutex::new(None),
            poll_interval,
            settle,
            // one build plus one retry
            rebuild_policy: RetryPolicy::new(2, retry_delay),
        }
    }

    /// Resolves with the number of subscribed channels once the
    /// subscriber covering them is acknowledged and polled.
    pub async fn subscribe(&self, channels: &[&str]) -> Result<usize> {
        self.add(Scope::Channel, channels).await
    }

    pub async fn psubscribe(&self, patterns: &[&str]) -> Result<usize> {
        self.add(Scope::Pattern, patterns).await
    }

    /// An empty slice removes every channel.
    pub async fn unsubscribe(&self, channels: &[&str]) -> Result<usize> {
        self.remove(Scope::Channel, channels).await
    }

    pub async fn punsubscribe(&self, patterns: &[&str]) -> Result<usize> {
        self.remove(Scope::Pattern, patterns).await
    }

    pub async fn channels(&self) -> Vec<String> {
        self.state.lock().await.channels.iter().cloned().collect()
    }

    pub async fn patterns(&self) -> Vec<String> {
        self.state.lock().await.patterns.iter().cloned().collect()
    }

    /// True while a subscriber is being polled.
    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.listener.is_some()
    }

    /// PUBLISH over the dedicated publish connection, opened on first use
    /// and replaced after a failure. Returns the receiver count.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<i64> {
        let argv = vec!["PUBLISH".to_string(), channel.to_string(), message.to_string()];
        let mut publisher = self.publisher.lock().await;
        if publisher.is_none() {
            *publisher = Some(self.driver.dedicated().await?);
            debug!("publish connection opened");
        }
        let Some(conn) = publisher.as_mut() else {
            return Err(Error::Closed);
        };
        match conn.execute(&argv).await {
            Ok(reply) if reply.is_error() => Err(translate_error(reply)),
            Ok(reply) => reply
                .as_int()
                .ok_or_else(|| Error::Protocol(format!("unexpected PUBLISH reply: {}", reply.type_name()))),
            Err(e) => {
                *publisher = None;
                Err(e)
            }
        }
    }

    /// Stop polling, forget every subscription and drop both connections.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(listener) = state.listener.take() {
            listener.stop().await;
        }
        state.channels.clear();
        state.patterns.clear();
        drop(state);
        self.publisher.lock().await.take();
    }

    async fn add(&self, scope: Scope, names: &[&str]) -> Result<usize> {
        if names.is_empty() {
            return Err(Error::Usage(format!("{} needs at least one name", scope.command())));
        }
        let mut state = self.state.lock().await;
        let before = state.set(scope).clone();
        let mut desired = before.clone();
        desired.extend(names.iter().map(|n| n.to_string()));

        if desired != before {
            let (channels, patterns) = state.with(scope, desired);
            self.rebuild(&mut state, channels, patterns).await?;
        }

        let mut running = before;
        for name in names {
            running.insert(name.to_string());
            self.events.emit(&scope.added(name.to_string(), running.len()));
        }
        Ok(state.set(scope).len())
    }

    async fn remove(&self, scope: Scope, names: &[&str]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let before = state.set(scope).clone();
        let targets: Vec<String> = if names.is_empty() {
            before.iter().cloned().collect()
        } else {
            names.iter().map(|n| n.to_string()).collect()
        };
        let mut desired = before.clone();
        for name in &targets {
            desired.remove(name);
        }

        if desired != before {
            let (channels, patterns) = state.with(scope, desired);
            self.rebuild(&mut state, channels, patterns).await?;
        }

        let mut running = before;
        for name in targets {
            running.remove(&name);
            let count = running.len();
            self.events.emit(&scope.removed(name, count));
        }
        Ok(state.set(scope).len())
    }

    /// Replace the subscriber with one covering exactly `channels` and
    /// `patterns`. The state only changes once the new one is live; on
    /// failure the previous subscriber keeps running.
    async fn rebuild(
        &self,
        state: &mut BridgeState,
        channels: BTreeSet<String>,
        patterns: BTreeSet<String>,
    ) -> Result<()> {
        if channels.is_empty() && patterns.is_empty() {
            if let Some(old) = state.listener.take() {
                old.stop().await;
            }
            debug!("last subscription removed, subscriber closed");
        } else {
            let ch: Vec<String> = channels.iter().cloned().collect();
            let pat: Vec<String> = patterns.iter().cloned().collect();
            let (driver, ch_ref, pat_ref) = (&*self.driver, &ch, &pat);
            let sub = with_retry(&self.rebuild_policy, "subscribe", move || {
                open_subscription(driver, ch_ref, pat_ref)
            })
            .await?;
            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }

            let listener = Listener::spawn(
                self.driver.clone(),
                sub,
                ch,
                pat,
                self.events.clone(),
                self.poll_interval,
            );
            if let Some(old) = state.listener.replace(listener) {
                old.stop().await;
            }
            debug!(
                channels = channels.len(),
                patterns = patterns.len(),
                "subscriber rebuilt"
            );
        }
        state.channels = channels;
        state.patterns = patterns;
        Ok(())
    }
}

async fn open_subscription<D: Driver>(driver: &D, channels: &[String], patterns: &[String]) -> Result<D::Subscription> {
    let mut sub = driver.subscribe(channels, patterns).await?;
    sub.confirm().await?;
    Ok(sub)
}

async fn poll_loop<D: Driver>(
    driver: Arc<D>,
    mut sub: D::Subscription,
    channels: Vec<String>,
    patterns: Vec<String>,
    alive: Arc<AtomicBool>,
    events: Arc<Emitter>,
    wait: Duration,
) {
    let backoff = RetryPolicy::new(u32::MAX, POLL_BACKOFF);
    let mut failures: u32 = 0;

    while alive.load(Ordering::Acquire) {
        match sub.next_message(wait).await {
            Ok(Some(msg)) => {
                failures = 0;
                events.emit(&message_event(msg));
            }
            Ok(None) => failures = 0,
            Err(e) => {
                warn!(error = %e, failures, "subscriber poll failed");
                tokio::time::sleep(backoff.delay_for_attempt(failures)).await;
                failures = failures.saturating_add(1);

                // a protocol error may leave the stream out of sync
                let fatal = e.is_connection_error() || matches!(e, Error::Protocol(_));
                if fatal && alive.load(Ordering::Acquire) {
                    match open_subscription(&*driver, &channels, &patterns).await {
                        Ok(fresh) => {
                            info!(channels = channels.len(), patterns = patterns.len(), "subscriber reconnected");
                            sub = fresh;
                        }
                        Err(e) => warn!(error = %e, "subscriber reconnect failed"),
                    }
                }
            }
        }
    }
    debug!("subscriber poll loop stopped");
}

fn message_event(msg: RawMessage) -> Event {
    let channel = String::from_utf8_lossy(&msg.channel).into_owned();
    let message = String::from_utf8_lossy(&msg.payload).into_owned();
    match msg.pattern {
        Some(pattern) => Event::PMessage {
            pattern: String::from_utf8_lossy(&pattern).into_owned(),
            channel,
            message,
        },
        None => Event::Message { channel, message },
    }
}

// ── Tests ──────────────────────────────────────────────────────────
