//! Redis transport.
//!
//! Connection pair backed by the `redis` crate: a multiplexed connection
//! for `PUBLISH` and a dedicated pub/sub connection for pattern
//! subscriptions.

#[cfg(feature = "transport_redis")]
#[allow(clippy::module_inception)]
mod redis;

#[cfg(feature = "transport_redis")]
pub use self::redis::create_connections;

#[cfg(not(feature = "transport_redis"))]
pub fn create_connections(
    _config: &crate::ClientConfig,
) -> crate::Result<crate::ConnectionPair> {
    Err(crate::PubSubError::Transport(
        "transport_redis feature is not enabled".into(),
    ))
}
