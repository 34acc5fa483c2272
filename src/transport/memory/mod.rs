// src/transport/memory/mod.rs

//! In-memory broker.
//!
//! This module provides a pure in-process stand-in for a Redis server's
//! pattern pub/sub. It is intended for tests, demos and single-process use.
//!
//! ## Reference Semantics
//!
//! - `psubscribe` takes effect immediately; a publish issued after it returns
//!   is delivered.
//! - Patterns use Redis glob syntax: `*`, `?`, `[...]` and `\` escapes.
//!   `*` also matches `.` and `/`.
//! - A publish delivers one `pmessage` per matching pattern per subscriber,
//!   the same way Redis does when several patterns of one connection match.
//! - Delivery is deterministic within a single process.
//!
//! ## Non-Goals
//!
//! Persistence, network behaviour and failure simulation. The brace
//! alternation accepted by the glob compiler (`{a,b}`) is not part of Redis
//! syntax and should not be relied on.

mod broker;
mod transport;

pub use broker::MemoryBroker;
pub use transport::create_connections;
