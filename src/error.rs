use thiserror::Error;

use crate::ConnectionRole;

/// Errors surfaced by the pub/sub client.
///
/// Values of this type travel two ways: returned from fallible calls such as
/// [`RedisPubSub::publish`](crate::RedisPubSub::publish), and delivered to
/// error listeners registered with
/// [`RedisPubSub::on_error`](crate::RedisPubSub::on_error).
#[derive(Error, Debug)]
pub enum PubSubError {
    /// A message could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound payload was not valid JSON.
    #[error("failed to decode payload on channel {channel}: {source} (payload: {payload})")]
    Decode {
        channel: String,
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error reported by the Redis client.
    #[cfg(feature = "transport_redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A topic pattern the broker could not accept.
    #[error("invalid topic pattern: {0}")]
    Pattern(String),

    /// The receiver connection failed to subscribe to a pattern that was
    /// already queued. The pattern is not considered subscribed afterwards.
    #[error("failed to subscribe to {pattern}: {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: Box<PubSubError>,
    },

    /// The connection dropped and is being re-established.
    #[error("{0} connection lost")]
    ConnectionLost(ConnectionRole),

    /// The connection has been closed; no further commands are accepted.
    #[error("connection closed")]
    Closed,

    /// A required configuration value was not provided.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connections spawn background tasks and need a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for pub/sub operations
pub type Result<T> = std::result::Result<T, PubSubError>;
