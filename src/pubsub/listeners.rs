// src/pubsub/listeners.rs

//! Generic listener registry.
//!
//! Maps an event name to the ordered list of callbacks registered for it.
//! The registry is a plain data structure with no locking and no side
//! effects; [`RedisPubSub`](crate::RedisPubSub) owns several of them behind
//! its state mutex and layers broker subscription bookkeeping on top.
//!
//! Callbacks are stored as `Arc<F>` so that an emit can snapshot them and
//! release the lock before invoking anything.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default per-event listener threshold before a leak warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Opaque handle identifying one registered listener.
///
/// Returned by every registration call and accepted by the removal calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Entry<F: ?Sized> {
    id: ListenerId,
    once: bool,
    callback: Arc<F>,
}

/// What happened when a listener was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Added {
    /// Listener count for the event after the add.
    pub count: usize,
    /// Set the first time the count exceeds the configured maximum.
    pub exceeded: Option<usize>,
}

pub(crate) struct Listeners<F: ?Sized> {
    // ---
    by_event: HashMap<String, Vec<Entry<F>>>,
    max_listeners: usize,
    warned: HashSet<String>,
}

impl<F: ?Sized> Listeners<F> {
    // ---
    pub fn new() -> Self {
        Self {
            by_event: HashMap::new(),
            max_listeners: DEFAULT_MAX_LISTENERS,
            warned: HashSet::new(),
        }
    }

    /// Set the warning threshold; 0 disables it.
    pub fn set_max_listeners(&mut self, max: usize) {
        self.max_listeners = max;
    }

    pub fn add(&mut self, event: &str, id: ListenerId, callback: Arc<F>, once: bool) -> Added {
        // ---
        let entries = self.by_event.entry(event.to_string()).or_default();
        entries.push(Entry { id, once, callback });
        let count = entries.len();

        let exceeded = if self.max_listeners > 0
            && count > self.max_listeners
            && self.warned.insert(event.to_string())
        {
            Some(self.max_listeners)
        } else {
            None
        };

        Added { count, exceeded }
    }

    /// Remove one listener. Returns the remaining count for the event, or
    /// `None` if the listener was not registered under it.
    pub fn remove(&mut self, event: &str, id: ListenerId) -> Option<usize> {
        // ---
        let entries = self.by_event.get_mut(event)?;
        let pos = entries.iter().position(|e| e.id == id)?;
        entries.remove(pos);

        let remaining = entries.len();
        if remaining == 0 {
            self.by_event.remove(event);
        }
        Some(remaining)
    }

    /// Remove every listener for `event`, returning how many were removed.
    pub fn remove_all(&mut self, event: &str) -> usize {
        self.by_event.remove(event).map_or(0, |entries| entries.len())
    }

    /// Remove everything, returning the events that had listeners.
    pub fn clear(&mut self) -> Vec<String> {
        self.by_event.drain().map(|(event, _)| event).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, Vec::len)
    }

    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.by_event.keys().cloned().collect();
        events.sort();
        events
    }

    /// Find the event a listener is registered under.
    pub fn event_of(&self, id: ListenerId) -> Option<String> {
        self.by_event
            .iter()
            .find(|(_, entries)| entries.iter().any(|e| e.id == id))
            .map(|(event, _)| event.clone())
    }

    /// Snapshot the callbacks for an emit of `event`, in registration order.
    ///
    /// One-shot listeners are removed from the registry here, before the
    /// caller gets a chance to invoke them.
    pub fn take_for_emit(&mut self, event: &str) -> Vec<Arc<F>> {
        // ---
        let Some(entries) = self.by_event.get_mut(event) else {
            return Vec::new();
        };

        let callbacks = entries.iter().map(|e| Arc::clone(&e.callback)).collect();

        entries.retain(|e| !e.once);
        if entries.is_empty() {
            self.by_event.remove(event);
        }

        callbacks
    }
}
