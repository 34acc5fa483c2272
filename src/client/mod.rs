//! Client factory.
//!
//! Composes a [`ConnectionPair`] and a [`RedisPubSub`] adapter into one
//! handle. A background pump task drains the pair's event stream: `Ready` and
//! `End` signals feed the client's one-shot latches, everything else goes to
//! the adapter.
//!
//! The pump only holds a weak reference to the adapter. Dropping the last
//! handle drops the adapter and with it both connections, which shut down
//! on drop.

mod lifecycle;

use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::pubsub::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    ClientConfig,
    ConnectionPair,
    EventReceiver,
    MemoryBroker,
    PubSubError,
    RedisPubSub,
    Result,
};

use lifecycle::{Aggregate, Lifecycle};

pub use lifecycle::AggregateLatch;

/// Pub/sub handle over an emitter and a receiver connection.
///
/// Dereferences to [`RedisPubSub`], so the whole listener API (`on`,
/// `once`, `remove_listener`, `publish`, ...) is available directly.
///
/// The aggregate `ready` signal fires once both connections are established
/// and never again, even across reconnects. The aggregate `end` signal fires
/// once both connections have ended.
///
/// Dropping the client without [`close`](Self::close) stops the event pump
/// and tears both connections down without waiting; no `end` signal is
/// delivered in that case.
pub struct PubSubClient {
    // ---
    pubsub: Arc<RedisPubSub>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl PubSubClient {
    // ---

    /// Compose an existing connection pair.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn with_connections(pair: ConnectionPair) -> Result<Self> {
        // ---
        let runtime = Handle::try_current().map_err(|_| PubSubError::NoRuntime)?;

        let ConnectionPair {
            emitter,
            receiver,
            events,
        } = pair;

        let pubsub = Arc::new(RedisPubSub::new(emitter, receiver));
        let pump = runtime.spawn(run_pump(
            pubsub.client_id().to_string(),
            Arc::downgrade(&pubsub),
            events,
        ));

        Ok(Self {
            pubsub,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Shared handle to the underlying adapter.
    pub fn pubsub(&self) -> Arc<RedisPubSub> {
        Arc::clone(&self.pubsub)
    }

    /// Close both connections and wait for the aggregate `end` signal.
    ///
    /// Queued publishes are flushed before the emitter closes. Closing twice
    /// is harmless.
    pub async fn close(&self) -> Result<()> {
        // ---
        log_debug!(self.pubsub.client_id() => "closing client");

        let emitter = Arc::clone(self.pubsub.emitter());
        let receiver = Arc::clone(self.pubsub.receiver());

        let emitter_result = emitter.close().await;
        let receiver_result = receiver.close().await;

        let pump = lock_ignore_poison(&self.pump).take();
        if let Some(pump) = pump {
            if let Err(_err) = pump.await {
                log_error!(self.pubsub.client_id() => "event pump failed: {_err}");
            }
        }

        emitter_result.and(receiver_result)
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        // ---
        if let Some(pump) = lock_ignore_poison(&self.pump).take() {
            log_debug!(self.pubsub.client_id() => "dropped without close");
            pump.abort();
        }
    }
}

impl Deref for PubSubClient {
    type Target = RedisPubSub;

    fn deref(&self) -> &Self::Target {
        &self.pubsub
    }
}

/// Drain connection events until both connections have ended or the
/// adapter is gone.
async fn run_pump(client_id: String, pubsub: Weak<RedisPubSub>, mut events: EventReceiver) {
    // ---
    let mut lifecycle = Lifecycle::new();

    while let Some((role, event)) = events.recv().await {
        let Some(pubsub) = pubsub.upgrade() else {
            break;
        };

        match lifecycle.observe(role, &event) {
            Some(Aggregate::Ready) => {
                log_info!(client_id => "both connections ready");
                pubsub.emit_ready();
            }
            Some(Aggregate::End) => {
                log_info!(client_id => "both connections ended");
                pubsub.emit_end();
                break;
            }
            None => pubsub.handle_event(role, event),
        }
    }

    log_debug!(client_id => "event pump stopped");
}

/// Create a client backed by two Redis connections.
///
/// Both connections are opened from the same `config` in the background;
/// register an [`on_ready`](RedisPubSub::on_ready) listener to learn when
/// they are up. Publishes and subscriptions issued earlier are queued.
///
/// # Errors
///
/// - invalid configuration (see [`ClientConfig::validate`])
/// - a URI the Redis client cannot parse
/// - [`PubSubError::NoRuntime`] outside a tokio runtime
///
/// # Example
///
/// ```no_run
/// use redis_pubsub::{create_client, ClientConfig};
///
/// # async fn example() -> redis_pubsub::Result<()> {
/// let client = create_client(&ClientConfig::new(6379, "localhost"))?;
/// client.on_ready(|| println!("connected"));
/// client.on("orders.*", |order, channel| println!("{channel}: {order}"));
/// # Ok(())
/// # }
/// ```
pub fn create_client(config: &ClientConfig) -> Result<PubSubClient> {
    // ---
    config.validate()?;

    let pair = crate::create_redis_connections(config)?;
    let client = PubSubClient::with_connections(pair)?;
    client.set_max_listeners(config.max_listeners);

    Ok(client)
}

/// Create a client attached to an in-process [`MemoryBroker`].
///
/// Clients created from the same broker see each other's publishes.
pub fn create_memory_client(broker: &Arc<MemoryBroker>, config: &ClientConfig) -> Result<PubSubClient> {
    // ---
    let pair = crate::create_memory_connections(broker, &config.client_id);
    let client = PubSubClient::with_connections(pair)?;
    client.set_max_listeners(config.max_listeners);

    Ok(client)
}
