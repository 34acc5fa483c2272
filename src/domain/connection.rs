// src/domain/connection.rs

//! Broker connection abstractions.
//!
//! The adapter talks to the broker through two independent connections: an
//! emitter used only for `PUBLISH`, and a receiver used only for pattern
//! subscriptions and inbound delivery. Redis requires the split, since a
//! connection in pub/sub mode cannot issue regular commands.
//!
//! Both connections are fire-and-forget: commands are queued and executed in
//! call order by the connection itself, and whatever happens afterwards
//! (readiness, failures, inbound messages, shutdown) is reported as a
//! [`ConnectionEvent`] on the pair's shared event stream.
//!
//! Concrete implementations live under `src/transport/`.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{PubSubError, Result};

/// Which half of a [`ConnectionPair`] a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    // ---
    /// Outbound connection carrying `PUBLISH` commands.
    Emitter,

    /// Inbound connection carrying pattern subscriptions and messages.
    Receiver,
}

impl ConnectionRole {
    pub(crate) fn index(self) -> usize {
        match self {
            ConnectionRole::Emitter => 0,
            ConnectionRole::Receiver => 1,
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Emitter => f.write_str("emitter"),
            ConnectionRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// Signals reported by a broker connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    // ---
    /// The connection is established and accepting commands. May repeat
    /// after a reconnect.
    Ready,

    /// The connection is gone for good.
    End,

    /// Something went wrong on the connection.
    Error(PubSubError),

    /// A message delivered through a pattern subscription.
    PMessage {
        /// The subscribed pattern that matched.
        pattern: String,
        /// The concrete channel the message was published on.
        channel: String,
        /// Raw payload as received from the broker.
        payload: Bytes,
    },
}

/// Sending half of a pair's event stream.
pub type EventSender = mpsc::UnboundedSender<(ConnectionRole, ConnectionEvent)>;

/// Receiving half of a pair's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<(ConnectionRole, ConnectionEvent)>;

/// Create the event stream shared by the two connections of a pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Shared identity embedded by every connection implementation.
///
/// Connections embed this as a field named `base` and return it from
/// `base()`, so the default trait methods can delegate to it.
#[derive(Debug, Clone)]
pub struct ConnectionBase {
    /// Client identifier, used for logging only.
    pub client_id: String,
    /// Which half of the pair this connection is.
    pub role: ConnectionRole,
}

impl ConnectionBase {
    pub fn new(client_id: impl Into<String>, role: ConnectionRole) -> Self {
        Self {
            client_id: client_id.into(),
            role,
        }
    }
}

/// Outbound half of a connection pair.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &ConnectionBase;

    /// Client identifier of this connection.
    fn client_id(&self) -> &str {
        &self.base().client_id
    }

    /// Queue a `PUBLISH` of `payload` to `channel`.
    ///
    /// Returns once the command is queued; the broker's answer is not
    /// awaited. Failures after queuing are reported as error events.
    fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Close the connection, flushing queued commands first.
    async fn close(&self) -> Result<()>;
}

/// Inbound half of a connection pair.
#[async_trait::async_trait]
pub trait PatternSubscriber: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &ConnectionBase;

    /// Client identifier of this connection.
    fn client_id(&self) -> &str {
        &self.base().client_id
    }

    /// Queue a `PSUBSCRIBE` for `pattern`.
    fn psubscribe(&self, pattern: &str) -> Result<()>;

    /// Queue a `PUNSUBSCRIBE` for `pattern`.
    fn punsubscribe(&self, pattern: &str) -> Result<()>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;
}

/// Shared emitter pointer.
pub type PublisherPtr = Arc<dyn Publisher>;

/// Shared receiver pointer.
pub type SubscriberPtr = Arc<dyn PatternSubscriber>;

/// Two independent broker connections and the event stream they report to.
///
/// The connections share no mutable state; only the event stream is common,
/// with each event tagged by the [`ConnectionRole`] that produced it.
pub struct ConnectionPair {
    pub emitter: PublisherPtr,
    pub receiver: SubscriberPtr,
    pub events: EventReceiver,
}
