// src/transport/memory/transport.rs

//! Connections to the in-memory broker.
//!
//! Both connections report `Ready` as soon as they are created and `End`
//! when closed. After `close()` every command fails with
//! [`PubSubError::Closed`]. A receiver dropped without `close()` detaches
//! from the broker silently.

use std::sync::{Arc, Mutex};

use super::MemoryBroker;
use crate::pubsub::lock_ignore_poison;
use crate::{
    // ---
    event_channel,
    ConnectionBase,
    ConnectionEvent,
    ConnectionPair,
    ConnectionRole,
    EventSender,
    PatternSubscriber,
    PubSubError,
    Publisher,
    Result,
};

struct MemoryPublisher {
    // ---
    base: ConnectionBase,
    broker: Arc<MemoryBroker>,
    events: Mutex<Option<EventSender>>,
}

#[async_trait::async_trait]
impl Publisher for MemoryPublisher {
    // ---

    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn publish(&self, channel: &str, payload: String) -> Result<()> {
        // ---
        if lock_ignore_poison(&self.events).is_none() {
            return Err(PubSubError::Closed);
        }
        self.broker.publish(channel, &payload);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        let events = lock_ignore_poison(&self.events).take();
        if let Some(events) = events {
            let _ = events.send((ConnectionRole::Emitter, ConnectionEvent::End));
        }
        Ok(())
    }
}

struct MemorySubscriber {
    // ---
    base: ConnectionBase,
    broker: Arc<MemoryBroker>,
    id: u64,
    events: Mutex<Option<EventSender>>,
}

impl MemorySubscriber {
    fn ensure_open(&self) -> Result<()> {
        match lock_ignore_poison(&self.events).as_ref() {
            Some(_) => Ok(()),
            None => Err(PubSubError::Closed),
        }
    }
}

#[async_trait::async_trait]
impl PatternSubscriber for MemorySubscriber {
    // ---

    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn psubscribe(&self, pattern: &str) -> Result<()> {
        self.ensure_open()?;
        self.broker.psubscribe(self.id, pattern)
    }

    fn punsubscribe(&self, pattern: &str) -> Result<()> {
        self.ensure_open()?;
        self.broker.punsubscribe(self.id, pattern)
    }

    async fn close(&self) -> Result<()> {
        // ---
        let events = lock_ignore_poison(&self.events).take();
        if let Some(events) = events {
            self.broker.detach(self.id);
            let _ = events.send((ConnectionRole::Receiver, ConnectionEvent::End));
        }
        Ok(())
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        self.broker.detach(self.id);
    }
}

/// Create an emitter/receiver pair attached to `broker`.
///
/// This transport is always available and requires no external resources.
pub fn create_connections(broker: &Arc<MemoryBroker>, client_id: &str) -> ConnectionPair {
    // ---
    let (events_tx, events_rx) = event_channel();

    let id = broker.attach(events_tx.clone());

    let receiver = MemorySubscriber {
        base: ConnectionBase::new(client_id, ConnectionRole::Receiver),
        broker: Arc::clone(broker),
        id,
        events: Mutex::new(Some(events_tx.clone())),
    };

    let emitter = MemoryPublisher {
        base: ConnectionBase::new(client_id, ConnectionRole::Emitter),
        broker: Arc::clone(broker),
        events: Mutex::new(Some(events_tx.clone())),
    };

    let _ = events_tx.send((ConnectionRole::Receiver, ConnectionEvent::Ready));
    let _ = events_tx.send((ConnectionRole::Emitter, ConnectionEvent::Ready));

    ConnectionPair {
        emitter: Arc::new(emitter),
        receiver: Arc::new(receiver),
        events: events_rx,
    }
}
