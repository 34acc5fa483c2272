//! Redis connection pair implemented with the `redis` crate.
//!
//! ## Concurrency model
//!
//! Each connection is owned by its own background **actor task**. All
//! interaction with the Redis client is serialized through that actor; no
//! other task touches the connection directly.
//!
//! - The emitter actor owns a `MultiplexedConnection` and executes queued
//!   `PUBLISH` commands one at a time, so publishes reach the broker in call
//!   order.
//! - The receiver actor owns a split `aio::PubSub`: the sink executes queued
//!   `PSUBSCRIBE` / `PUNSUBSCRIBE` commands while the stream is polled in the
//!   same `select!` for incoming `pmessage`s.
//!
//! Commands are queued on an unbounded channel, so neither `publish()` nor
//! `psubscribe()` ever blocks the caller. Outcomes are reported on the pair's
//! event stream.
//!
//! ## Connecting and reconnecting
//!
//! Both actors connect in the background, retrying every `reconnect_delay`
//! until `max_connect_attempts` is exhausted. Each failed attempt is reported
//! as an error event; giving up reports `End`.
//!
//! When its connection drops, an actor reports
//! [`PubSubError::ConnectionLost`], waits `reconnect_delay`, reconnects and
//! reports `Ready` again. The client's one-shot latch keeps that second
//! `Ready` from reaching listeners. The emitter notices the drop on the
//! first `PUBLISH` that fails with an I/O error; that publish is reported
//! and not retried. The receiver notices when the pub/sub stream ends and
//! re-issues every pattern it holds after reconnecting.
//!
//! A `PSUBSCRIBE` the server refuses is reported as
//! [`PubSubError::Subscribe`] and the pattern is dropped.
//!
//! Dropping a connection handle shuts its actor down as `close()` would,
//! without waiting for it.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink};
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo, RedisError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::pubsub::lock_ignore_poison;
use crate::{
    // ---
    event_channel,
    log_debug,
    log_error,
    log_info,
    log_warn,
    ClientConfig,
    ConnectionBase,
    ConnectionEvent,
    ConnectionPair,
    ConnectionRole,
    EventSender,
    PatternSubscriber,
    PubSubError,
    Publisher,
    Result,
};

//
// Actor commands
//

enum EmitterCmd {
    Publish { channel: String, payload: String },
}

enum ReceiverCmd {
    PSubscribe(String),
    PUnsubscribe(String),
}

enum ActorStep {
    //
    Reconnect,
    Stop,
}

/// Caller-side handle to an actor task.
struct ActorHandle<C> {
    // ---
    cmd_tx: mpsc::UnboundedSender<C>,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C> ActorHandle<C> {
    // ---

    fn send(&self, cmd: C) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| PubSubError::Closed)
    }

    /// Ask the actor to stop and wait for it.
    async fn stop(&self) {
        // ---
        self.shutdown.notify_one();

        let task = lock_ignore_poison(&self.task).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl<C> Drop for ActorHandle<C> {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Whether `err` means the connection has to be replaced.
fn connection_lost(err: &RedisError) -> bool {
    err.is_connection_dropped() || err.is_unrecoverable_error()
}

/// Connection state shared by both actors.
struct Connector {
    // ---
    client_id: String, // for logging only
    role: ConnectionRole,
    client: redis::Client,
    events: EventSender,
    shutdown: Arc<Notify>,
    reconnect_delay: Duration,
    max_connect_attempts: Option<u32>,
}

impl Connector {
    // ---

    fn emit(&self, event: ConnectionEvent) {
        // The client may be gone already; nothing left to tell.
        let _ = self.events.send((self.role, event));
    }

    fn report_lost(&self) {
        log_error!(self.client_id => "{} connection lost", self.role);
        self.emit(ConnectionEvent::Error(PubSubError::ConnectionLost(self.role)));
    }

    /// Sleep before reconnecting. Returns `false` if shutdown was requested
    /// meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => true,
            _ = self.shutdown.notified() => false,
        }
    }

    /// Run `connect` until it succeeds.
    ///
    /// Returns `None` when shutdown is requested or the attempt limit is
    /// reached.
    async fn establish<T, F, Fut>(&self, mut connect: F) -> Option<T>
    where
        F: FnMut(redis::Client) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        // ---
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                result = connect(self.client.clone()) => result,
                _ = self.shutdown.notified() => return None,
            };

            match result {
                Ok(conn) => return Some(conn),
                Err(err) => {
                    log_warn!(
                        self.client_id => "{} connect attempt {attempt} failed: {err}",
                        self.role
                    );
                    self.emit(ConnectionEvent::Error(err.into()));

                    if self.max_connect_attempts.is_some_and(|max| attempt >= max) {
                        log_error!(
                            self.client_id => "{} giving up after {attempt} attempts",
                            self.role
                        );
                        return None;
                    }
                }
            }

            if !self.pause().await {
                return None;
            }
        }
    }
}

// --------------------
// Emitter
// --------------------

struct RedisPublisher {
    // ---
    base: ConnectionBase,
    actor: ActorHandle<EmitterCmd>,
}

#[async_trait::async_trait]
impl Publisher for RedisPublisher {
    // ---

    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn publish(&self, channel: &str, payload: String) -> Result<()> {
        self.actor.send(EmitterCmd::Publish {
            channel: channel.to_string(),
            payload,
        })
    }

    async fn close(&self) -> Result<()> {
        self.actor.stop().await;
        Ok(())
    }
}

struct EmitterActor {
    // ---
    connector: Connector,
    cmd_rx: mpsc::UnboundedReceiver<EmitterCmd>,
}

impl EmitterActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            let conn = self
                .connector
                .establish(|client| async move { client.get_multiplexed_async_connection().await })
                .await;

            let Some(mut conn) = conn else {
                break;
            };

            log_info!(self.connector.client_id => "emitter connected");
            self.connector.emit(ConnectionEvent::Ready);

            let step = loop {
                tokio::select! {
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => {
                                if !self.execute(&mut conn, cmd).await {
                                    self.connector.report_lost();
                                    break ActorStep::Reconnect;
                                }
                            }
                            None => break ActorStep::Stop,
                        }
                    }

                    _ = self.connector.shutdown.notified() => {
                        self.flush(&mut conn).await;
                        break ActorStep::Stop;
                    }
                }
            };

            if matches!(step, ActorStep::Stop) || !self.connector.pause().await {
                break;
            }
        }

        log_debug!(self.connector.client_id => "emitter stopped");
        self.connector.emit(ConnectionEvent::End);
    }

    /// Returns `false` once the connection is unusable.
    async fn execute(&self, conn: &mut MultiplexedConnection, cmd: EmitterCmd) -> bool {
        // ---
        match cmd {
            EmitterCmd::Publish { channel, payload } => {
                let result = redis::cmd("PUBLISH")
                    .arg(&channel)
                    .arg(&payload)
                    .query_async::<i64>(conn)
                    .await;

                match result {
                    Ok(_receivers) => {
                        log_debug!(
                            self.connector.client_id => "published to {channel} ({_receivers} receivers)"
                        );
                        true
                    }
                    Err(err) => {
                        log_error!(
                            self.connector.client_id => "publish failed for channel {channel}: {err}"
                        );
                        let lost = connection_lost(&err);
                        self.connector.emit(ConnectionEvent::Error(err.into()));
                        !lost
                    }
                }
            }
        }
    }

    /// Execute everything still queued, then refuse further commands.
    async fn flush(&mut self, conn: &mut MultiplexedConnection) {
        // ---
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            if !self.execute(conn, cmd).await {
                break;
            }
        }
    }
}

// --------------------
// Receiver
// --------------------

struct RedisSubscriber {
    // ---
    base: ConnectionBase,
    actor: ActorHandle<ReceiverCmd>,
}

#[async_trait::async_trait]
impl PatternSubscriber for RedisSubscriber {
    // ---

    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn psubscribe(&self, pattern: &str) -> Result<()> {
        self.actor.send(ReceiverCmd::PSubscribe(pattern.to_string()))
    }

    fn punsubscribe(&self, pattern: &str) -> Result<()> {
        self.actor.send(ReceiverCmd::PUnsubscribe(pattern.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.actor.stop().await;
        Ok(())
    }
}

struct ReceiverActor {
    // ---
    connector: Connector,
    cmd_rx: mpsc::UnboundedReceiver<ReceiverCmd>,
    patterns: BTreeSet<String>,
}

impl ReceiverActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            let pubsub = self
                .connector
                .establish(|client| async move { client.get_async_pubsub().await })
                .await;

            let Some(pubsub) = pubsub else {
                break;
            };

            let (mut sink, mut stream) = pubsub.split();
            self.restore(&mut sink).await;

            log_info!(self.connector.client_id => "receiver connected");
            self.connector.emit(ConnectionEvent::Ready);

            let step = loop {
                tokio::select! {
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => self.execute(&mut sink, cmd).await,
                            None => break ActorStep::Stop,
                        }
                    }

                    maybe_msg = stream.next() => {
                        match maybe_msg {
                            Some(msg) => self.forward(msg),
                            None => {
                                self.connector.report_lost();
                                break ActorStep::Reconnect;
                            }
                        }
                    }

                    _ = self.connector.shutdown.notified() => {
                        break ActorStep::Stop;
                    }
                }
            };

            if matches!(step, ActorStep::Stop) || !self.connector.pause().await {
                break;
            }
        }

        log_debug!(self.connector.client_id => "receiver stopped");
        self.connector.emit(ConnectionEvent::End);
    }

    async fn execute(&mut self, sink: &mut PubSubSink, cmd: ReceiverCmd) {
        // ---
        match cmd {
            ReceiverCmd::PSubscribe(pattern) => match sink.psubscribe(pattern.as_str()).await {
                Ok(()) => {
                    log_debug!(self.connector.client_id => "psubscribed {pattern}");
                    self.patterns.insert(pattern);
                }
                Err(err) if connection_lost(&err) => {
                    // re-issued by restore() once the stream has reconnected
                    log_warn!(
                        self.connector.client_id => "psubscribe {pattern} interrupted: {err}"
                    );
                    self.patterns.insert(pattern);
                }
                Err(err) => {
                    log_error!(
                        self.connector.client_id => "failed to psubscribe {pattern}: {err}"
                    );
                    self.connector.emit(ConnectionEvent::Error(PubSubError::Subscribe {
                        pattern,
                        source: Box::new(err.into()),
                    }));
                }
            },
            ReceiverCmd::PUnsubscribe(pattern) => {
                self.patterns.remove(&pattern);
                if let Err(err) = sink.punsubscribe(pattern.as_str()).await {
                    log_error!(
                        self.connector.client_id => "failed to punsubscribe {pattern}: {err}"
                    );
                    self.connector.emit(ConnectionEvent::Error(err.into()));
                }
            }
        }
    }

    /// Re-issue every pattern held before a reconnect.
    ///
    /// Patterns stay held on failure and are tried again after the next
    /// reconnect.
    async fn restore(&self, sink: &mut PubSubSink) {
        // ---
        for pattern in &self.patterns {
            if let Err(err) = sink.psubscribe(pattern.as_str()).await {
                log_error!(
                    self.connector.client_id => "failed to restore {pattern}: {err}"
                );
                self.connector.emit(ConnectionEvent::Error(err.into()));
            }
        }
    }

    /// Report an incoming pattern message upwards.
    fn forward(&self, msg: redis::Msg) {
        // ---
        if !msg.from_pattern() {
            log_debug!(
                self.connector.client_id => "ignoring plain message on {}",
                msg.get_channel_name()
            );
            return;
        }

        let pattern: String = match msg.get_pattern() {
            Ok(pattern) => pattern,
            Err(err) => {
                self.connector.emit(ConnectionEvent::Error(err.into()));
                return;
            }
        };

        self.connector.emit(ConnectionEvent::PMessage {
            pattern,
            channel: msg.get_channel_name().to_string(),
            payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
        });
    }
}

// --------------------
// Factory
// --------------------

/// Connection settings for `config`.
///
/// An explicit URI is parsed as is; otherwise the address and credentials
/// are passed through without any URI encoding.
fn connection_info(config: &ClientConfig) -> redis::RedisResult<ConnectionInfo> {
    // ---
    if let Some(uri) = &config.uri {
        return uri.as_str().into_connection_info();
    }

    let mut settings = RedisConnectionInfo::default().set_db(config.db.unwrap_or(0));
    if let Some(username) = &config.username {
        settings = settings.set_username(username);
    }
    if let Some(password) = &config.password {
        settings = settings.set_password(password);
    }

    Ok(ConnectionAddr::Tcp(config.host.clone(), config.port)
        .into_connection_info()?
        .set_redis_settings(settings))
}

/// Open an emitter/receiver pair from `config`.
///
/// Returns immediately; both connections are established by their actors in
/// the background and report `Ready` on the returned event stream.
///
/// # Errors
///
/// - invalid configuration or a URI the Redis client rejects
/// - [`PubSubError::NoRuntime`] outside a tokio runtime
pub fn create_connections(config: &ClientConfig) -> Result<ConnectionPair> {
    // ---
    let runtime = Handle::try_current().map_err(|_| PubSubError::NoRuntime)?;
    config.validate()?;

    let info = connection_info(config).map_err(|err| {
        log_error!(config.client_id => "invalid connection settings: {err}");
        PubSubError::from(err)
    })?;
    let endpoint = config.endpoint();

    let client = redis::Client::open(info).map_err(|err| {
        log_error!(config.client_id => "failed to open redis client for {endpoint}: {err}");
        PubSubError::from(err)
    })?;

    let (events_tx, events_rx) = event_channel();

    let connector = |role: ConnectionRole, shutdown: &Arc<Notify>| Connector {
        client_id: config.client_id.clone(),
        role,
        client: client.clone(),
        events: events_tx.clone(),
        shutdown: Arc::clone(shutdown),
        reconnect_delay: config.reconnect_delay,
        max_connect_attempts: config.max_connect_attempts,
    };

    // emitter
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(Notify::new());
    let task = runtime.spawn(
        EmitterActor {
            connector: connector(ConnectionRole::Emitter, &shutdown),
            cmd_rx,
        }
        .run(),
    );
    let emitter = RedisPublisher {
        base: ConnectionBase::new(config.client_id.clone(), ConnectionRole::Emitter),
        actor: ActorHandle {
            cmd_tx,
            shutdown,
            task: Mutex::new(Some(task)),
        },
    };

    // receiver
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(Notify::new());
    let task = runtime.spawn(
        ReceiverActor {
            connector: connector(ConnectionRole::Receiver, &shutdown),
            cmd_rx,
            patterns: BTreeSet::new(),
        }
        .run(),
    );
    let receiver = RedisSubscriber {
        base: ConnectionBase::new(config.client_id.clone(), ConnectionRole::Receiver),
        actor: ActorHandle {
            cmd_tx,
            shutdown,
            task: Mutex::new(Some(task)),
        },
    };

    log_info!(config.client_id => "connecting to redis at {endpoint}");

    Ok(ConnectionPair {
        emitter: Arc::new(emitter),
        receiver: Arc::new(receiver),
        events: events_rx,
    })
}
