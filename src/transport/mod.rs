//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! [`Publisher`](crate::Publisher) and
//! [`PatternSubscriber`](crate::PatternSubscriber) traits, exposed only
//! through constructor functions that return a
//! [`ConnectionPair`](crate::ConnectionPair).
//!
//! Adapter code must not depend on transport-specific types.

mod memory;
mod redis;

pub use memory::create_connections as create_memory_connections;
pub use memory::MemoryBroker;
pub use self::redis::create_connections as create_redis_connections;
