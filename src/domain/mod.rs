//! Domain layer public interface.
//!
//! This module defines the connection abstractions the adapter is written
//! against. They are independent of any concrete broker client.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod connection;

// --- Connection domain re-exports ---

pub use connection::{
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
