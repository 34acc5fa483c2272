//! Event-listener style publish/subscribe over Redis pattern subscriptions.
//!
//! A client keeps two broker connections: one for `PUBLISH`, one for
//! `PSUBSCRIBE`. Listeners are registered under topic patterns; the first
//! listener on a pattern subscribes at the broker, the last one removed
//! unsubscribes, and every listener in between shares the one broker
//! subscription. Payloads travel as JSON and arrive decoded, together with
//! the concrete channel they were published on.
//!
//! ```no_run
//! use redis_pubsub::{create_client, ClientConfig};
//!
//! # async fn example() -> redis_pubsub::Result<()> {
//! let client = create_client(&ClientConfig::new(6379, "localhost"))?;
//!
//! client.on_error(|err| eprintln!("pubsub error: {err}"));
//! client.on("chat.*", |message, channel| println!("[{channel}] {message}"));
//!
//! client.publish("chat.lobby", &serde_json::json!({ "from": "ana", "text": "hi" }))?;
//! # Ok(())
//! # }
//! ```
//!

// Import all sub modules once...
mod client;
mod domain;
mod pubsub;
mod transport;

mod client_config;

mod error;
mod macros;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{create_client, create_memory_client, AggregateLatch, PubSubClient};
pub use pubsub::{
    //
    ErrorListener,
    ListenerId,
    RedisPubSub,
    SignalListener,
    TopicListener,
    DEFAULT_MAX_LISTENERS,
};

pub use client_config::{ClientConfig, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY};

pub use error::{PubSubError, Result};

pub use transport::{create_memory_connections, create_redis_connections, MemoryBroker};

// --- public re-exports
pub use domain::{
    //
    event_channel,
    ConnectionBase,
    ConnectionEvent,
    ConnectionPair,
    ConnectionRole,
    EventReceiver,
    EventSender,
    PatternSubscriber,
    Publisher,
    PublisherPtr,
    SubscriberPtr,
};
