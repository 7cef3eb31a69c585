//! Listener registry for client lifecycle and pub/sub events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Error;

/// Event names listeners register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Ready,
    Error,
    End,
    Message,
    PMessage,
    Subscribe,
    Unsubscribe,
    PSubscribe,
    PUnsubscribe,
}

/// An emitted event with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    Connect,
    Ready,
    Error(Error),
    End,
    Message { channel: String, message: String },
    PMessage { pattern: String, channel: String, message: String },
    /// `count` is the number of subscriptions of the same kind afterwards.
    Subscribe { channel: String, count: usize },
    Unsubscribe { channel: String, count: usize },
    PSubscribe { pattern: String, count: usize },
    PUnsubscribe { pattern: String, count: usize },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Ready => EventKind::Ready,
            Self::Error(_) => EventKind::Error,
            Self::End => EventKind::End,
            Self::Message { .. } => EventKind::Message,
            Self::PMessage { .. } => EventKind::PMessage,
            Self::Subscribe { .. } => EventKind::Subscribe,
            Self::Unsubscribe { .. } => EventKind::Unsubscribe,
            Self::PSubscribe { .. } => EventKind::PSubscribe,
            Self::PUnsubscribe { .. } => EventKind::PUnsubscribe,
        }
    }
}

/// Handle returned by [`Emitter::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-instance observer registry.
#[derive(Default)]
pub struct Emitter {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(lid, _)| *lid == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Call every listener for the event's kind in registration order and
    /// return how many ran. Listeners may register or unregister others.
    pub fn emit(&self, event: &Event) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.read().get(&event.kind()) {
            Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
