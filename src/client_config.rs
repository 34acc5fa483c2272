//! Client connection parameters.
//!
//! Everything is passed in memory; there is no configuration file. Both
//! connections of a client are created from the same `ClientConfig`.

use std::time::Duration;

use crate::{PubSubError, Result, DEFAULT_MAX_LISTENERS};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default delay between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connection parameters for a pub/sub client.
///
/// # Example
///
/// ```
/// use redis_pubsub::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new(6380, "cache.internal")
///     .with_db(2)
///     .with_password("s3cret")
///     .with_client_id("orders-worker")
///     .with_reconnect_delay(Duration::from_millis(500));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.endpoint(), "cache.internal:6380/2");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // ---
    /// Broker host name or address.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Logical database index selected on connect.
    pub db: Option<i64>,

    /// ACL user name.
    pub username: Option<String>,

    /// Password (or ACL password when `username` is set).
    ///
    /// Handed to the connection as is; no URI escaping is needed.
    pub password: Option<String>,

    /// Full connection URI. When set it takes precedence over the
    /// individual host/port/db/credential fields. Reserved characters in
    /// its credentials must be percent-encoded.
    pub uri: Option<String>,

    /// Identifier used in log messages.
    pub client_id: String,

    /// Delay between connection attempts.
    pub reconnect_delay: Duration,

    /// Give up after this many failed connection attempts (`None` retries
    /// forever).
    pub max_connect_attempts: Option<u32>,

    /// Per-pattern listener count above which a leak warning is logged.
    pub max_listeners: usize,
}

impl Default for ClientConfig {
    /// `127.0.0.1:6379`, database 0, no credentials.
    fn default() -> Self {
        Self::new(DEFAULT_PORT, "127.0.0.1")
    }
}

impl ClientConfig {
    /// Create a config for `host:port`.
    pub fn new(port: u16, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            db: None,
            username: None,
            password: None,
            uri: None,
            client_id: "redis-pubsub".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_connect_attempts: None,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    /// Create a config from a full `redis://` or `rediss://` URI.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Select a logical database.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    /// Authenticate with a password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authenticate as an ACL user.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the identifier used in log messages.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the delay between connection attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Limit the number of connection attempts.
    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = Some(attempts);
        self
    }

    /// Set the listener leak warning threshold (0 disables it).
    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Check the config for values no connection could work with.
    ///
    /// # Errors
    ///
    /// - [`PubSubError::MissingConfig`] for an empty host or URI
    /// - [`PubSubError::InvalidConfig`] for port 0, a negative database or
    ///   a zero attempt limit
    pub fn validate(&self) -> Result<()> {
        // ---
        match &self.uri {
            Some(uri) if uri.trim().is_empty() => {
                return Err(PubSubError::MissingConfig("uri".into()));
            }
            Some(_) => {}
            None => {
                if self.host.trim().is_empty() {
                    return Err(PubSubError::MissingConfig("host".into()));
                }
                if self.port == 0 {
                    return Err(PubSubError::InvalidConfig("port must be non-zero".into()));
                }
            }
        }

        if matches!(self.db, Some(db) if db < 0) {
            return Err(PubSubError::InvalidConfig(
                "db must not be negative".into(),
            ));
        }

        if self.max_connect_attempts == Some(0) {
            return Err(PubSubError::InvalidConfig(
                "max_connect_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Where the client connects, for log and error messages.
    ///
    /// Never includes credentials. An explicit URI is shown without its
    /// user info; IPv6 hosts are bracketed.
    pub fn endpoint(&self) -> String {
        // ---
        if let Some(uri) = &self.uri {
            return match (uri.find("://"), uri.rfind('@')) {
                (Some(scheme), Some(at)) if at > scheme => {
                    format!("{}{}", &uri[..scheme + 3], &uri[at + 1..])
                }
                _ => uri.clone(),
            };
        }

        let db = self.db.map(|db| format!("/{db}")).unwrap_or_default();

        if self.host.contains(':') {
            format!("[{}]:{}{db}", self.host, self.port)
        } else {
            format!("{}:{}{db}", self.host, self.port)
        }
    }
}
