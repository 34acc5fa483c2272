// src/macros.rs

//
// Logging macros
//
// Every call names the client it logs for:
//
//     log_warn!(self.client_id => "psubscribe {pattern} failed: {err}");
//
// logging feature enabled → tracing event under the `redis_pubsub` target,
//                           with the client id as the `client` field
// logging feature disabled → only log_error prints, to stderr, as
//                           `redis_pubsub[<client>]: <message>`
//

#![allow(unused_macros)]

// --------------------
// ERROR
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($client:expr => $($arg:tt)*) => {
        tracing::error!(target: "redis_pubsub", client = %$client, $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($client:expr => $($arg:tt)*) => {
        eprintln!("redis_pubsub[{}]: {}", $client, format_args!($($arg)*))
    };
}

// --------------------
// WARN
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($client:expr => $($arg:tt)*) => {
        tracing::warn!(target: "redis_pubsub", client = %$client, $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($client:expr => $($arg:tt)*) => {{
        let _ = &$client;
    }};
}

// --------------------
// INFO
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($client:expr => $($arg:tt)*) => {
        tracing::info!(target: "redis_pubsub", client = %$client, $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($client:expr => $($arg:tt)*) => {{
        let _ = &$client;
    }};
}

// --------------------
// DEBUG
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($client:expr => $($arg:tt)*) => {
        tracing::debug!(target: "redis_pubsub", client = %$client, $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($client:expr => $($arg:tt)*) => {{
        let _ = &$client;
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
