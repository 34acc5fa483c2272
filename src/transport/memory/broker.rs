// src/transport/memory/broker.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use globset::{GlobBuilder, GlobMatcher};

use crate::pubsub::lock_ignore_poison;
use crate::{ConnectionEvent, ConnectionRole, EventSender, PubSubError, Result};

struct Subscriber {
    // ---
    patterns: BTreeMap<String, GlobMatcher>,
    events: EventSender,
}

/// In-process pattern pub/sub broker.
///
/// Cheap to share: create one with [`MemoryBroker::new`] and attach any
/// number of clients to it with
/// [`create_memory_client`](crate::create_memory_client).
pub struct MemoryBroker {
    // ---
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    // ---

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Deliver `payload` to every subscriber pattern matching `channel`.
    ///
    /// Returns the number of deliveries, like the reply to Redis `PUBLISH`.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        // ---
        let subscribers = lock_ignore_poison(&self.subscribers);
        let payload = Bytes::copy_from_slice(payload.as_bytes());
        let mut delivered = 0;

        for subscriber in subscribers.values() {
            for (pattern, matcher) in &subscriber.patterns {
                if !matcher.is_match(channel) {
                    continue;
                }

                let event = ConnectionEvent::PMessage {
                    pattern: pattern.clone(),
                    channel: channel.to_string(),
                    payload: payload.clone(),
                };

                // A closed event stream means the client is gone.
                if subscriber.events.send((ConnectionRole::Receiver, event)).is_ok() {
                    delivered += 1;
                }
            }
        }

        delivered
    }

    /// Total number of pattern subscriptions across all subscribers, like
    /// Redis `PUBSUB NUMPAT`.
    pub fn pattern_count(&self) -> usize {
        lock_ignore_poison(&self.subscribers)
            .values()
            .map(|s| s.patterns.len())
            .sum()
    }

    /// Number of attached receiver connections.
    pub fn subscriber_count(&self) -> usize {
        lock_ignore_poison(&self.subscribers).len()
    }

    pub(crate) fn attach(&self, events: EventSender) -> u64 {
        // ---
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_ignore_poison(&self.subscribers).insert(
            id,
            Subscriber {
                patterns: BTreeMap::new(),
                events,
            },
        );
        id
    }

    pub(crate) fn detach(&self, id: u64) {
        lock_ignore_poison(&self.subscribers).remove(&id);
    }

    pub(crate) fn psubscribe(&self, id: u64, pattern: &str) -> Result<()> {
        // ---
        let matcher = compile(pattern)?;

        let mut subscribers = lock_ignore_poison(&self.subscribers);
        let subscriber = subscribers.get_mut(&id).ok_or(PubSubError::Closed)?;
        subscriber.patterns.insert(pattern.to_string(), matcher);
        Ok(())
    }

    pub(crate) fn punsubscribe(&self, id: u64, pattern: &str) -> Result<()> {
        // ---
        let mut subscribers = lock_ignore_poison(&self.subscribers);
        let subscriber = subscribers.get_mut(&id).ok_or(PubSubError::Closed)?;
        subscriber.patterns.remove(pattern);
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    // ---
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| PubSubError::Pattern(format!("{pattern}: {err}")))
}
