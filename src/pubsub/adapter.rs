// src/pubsub/adapter.rs

//! The pub/sub adapter.
//!
//! [`RedisPubSub`] presents a pair of broker connections as an event-listener
//! API. Listeners are registered under a topic pattern; the first listener
//! for a pattern issues a `PSUBSCRIBE`, the last one removed issues the
//! matching `PUNSUBSCRIBE`. Any number of local listeners share one broker
//! subscription.
//!
//! ## Registry invariant
//!
//! A pattern is in the subscription registry if and only if a `psubscribe`
//! was issued for it and neither a `punsubscribe` nor a refusal from the
//! receiver ([`PubSubError::Subscribe`]) has been seen since. The
//! registry and the listener lists are mutated together under one mutex, and
//! broker commands are queued while it is held, so the command order seen by
//! the receiver connection always matches the registry history.
//!
//! ## Callbacks
//!
//! Callbacks run on the caller's thread (for [`RedisPubSub::emit`]) or on
//! the client's event pump task (for inbound messages), never with the
//! state lock held. A callback may therefore register or remove listeners,
//! including itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use super::codec;
use super::listeners::{ListenerId, Listeners};
use super::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    ConnectionEvent,
    ConnectionRole,
    PubSubError,
    PublisherPtr,
    Result,
    SubscriberPtr,
};

/// Callback invoked with `(payload, channel)` for every matching message.
pub type TopicListener = dyn Fn(&Value, &str) + Send + Sync;

/// Callback invoked with every error surfaced by the client.
pub type ErrorListener = dyn Fn(&PubSubError) + Send + Sync;

/// Callback for the aggregate `ready` and `end` signals.
pub type SignalListener = dyn Fn() + Send + Sync;

const ERROR: &str = "error";
const READY: &str = "ready";
const END: &str = "end";

struct State {
    // ---
    topics: Listeners<TopicListener>,
    subscribed: HashSet<String>,
    errors: Listeners<ErrorListener>,
    signals: Listeners<SignalListener>,
}

/// Event-listener style pub/sub over a broker connection pair.
///
/// # Example
///
/// ```no_run
/// # use redis_pubsub::{create_memory_client, ClientConfig, MemoryBroker};
/// # async fn example() -> redis_pubsub::Result<()> {
/// let broker = MemoryBroker::new();
/// let client = create_memory_client(&broker, &ClientConfig::default())?;
///
/// let id = client.on("sensors.*", |payload, channel| {
///     println!("{channel}: {payload}");
/// });
///
/// client.publish("sensors.kitchen", &serde_json::json!({ "celsius": 21.5 }))?;
///
/// client.remove_listener("sensors.*", id);
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisPubSub {
    // ---
    client_id: String,
    emitter: PublisherPtr,
    receiver: SubscriberPtr,
    state: Mutex<State>,
    next_id: AtomicU64,
    ready: AtomicBool,
    ended: AtomicBool,
}

impl RedisPubSub {
    // ---

    /// Wrap an emitter and a receiver connection.
    ///
    /// No broker command is issued until the first listener is registered.
    pub fn new(emitter: PublisherPtr, receiver: SubscriberPtr) -> Self {
        // ---
        let client_id = emitter.client_id().to_string();

        Self {
            client_id,
            emitter,
            receiver,
            state: Mutex::new(State {
                topics: Listeners::new(),
                subscribed: HashSet::new(),
                errors: Listeners::new(),
                signals: Listeners::new(),
            }),
            next_id: AtomicU64::new(1),
            ready: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    /// Client identifier taken from the emitter connection.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn emitter(&self) -> &PublisherPtr {
        &self.emitter
    }

    pub(crate) fn receiver(&self) -> &SubscriberPtr {
        &self.receiver
    }

    // --------------------
    // Topic listeners
    // --------------------

    /// Register `listener` for messages matching `pattern`.
    ///
    /// `pattern` uses the broker's glob syntax (`*`, `?`, `[...]`). The
    /// listener receives the decoded payload and the concrete channel name.
    pub fn on<F>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        self.add_topic_listener(pattern, Arc::new(listener), false)
    }

    /// Register `listener` for the next message matching `pattern` only.
    ///
    /// The listener is removed before it runs. If it was the last listener
    /// on the pattern, the broker subscription is dropped as well.
    pub fn once<F>(&self, pattern: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        self.add_topic_listener(pattern, Arc::new(listener), true)
    }

    fn add_topic_listener(
        &self,
        pattern: &str,
        listener: Arc<TopicListener>,
        once: bool,
    ) -> ListenerId {
        // ---
        let id = self.next_listener_id();

        let failure = {
            let mut state = lock_ignore_poison(&self.state);

            let added = state.topics.add(pattern, id, listener, once);
            if let Some(_max) = added.exceeded {
                log_warn!(
                    self.client_id => "{} listeners registered for {pattern} (max {_max}), possible listener leak",
                    added.count
                );
            }

            self.ensure_subscribed(&mut state, pattern).err()
        };

        if let Some(err) = failure {
            self.emit_error(err);
        }
        id
    }

    /// Remove one listener from `pattern`.
    ///
    /// Returns `false` if no such listener was registered under `pattern`.
    pub fn remove_listener(&self, pattern: &str, id: ListenerId) -> bool {
        // ---
        let (removed, failure) = {
            let mut state = lock_ignore_poison(&self.state);
            match state.topics.remove(pattern, id) {
                Some(_) => (true, self.release_if_unused(&mut state, pattern).err()),
                None => (false, None),
            }
        };

        if let Some(err) = failure {
            self.emit_error(err);
        }
        removed
    }

    /// Remove every listener from `pattern`, returning how many there were.
    pub fn remove_all_listeners(&self, pattern: &str) -> usize {
        // ---
        let (removed, failure) = {
            let mut state = lock_ignore_poison(&self.state);
            let removed = state.topics.remove_all(pattern);
            (removed, self.release_if_unused(&mut state, pattern).err())
        };

        if let Some(err) = failure {
            self.emit_error(err);
        }
        removed
    }

    /// Remove every topic listener and drop all broker subscriptions.
    ///
    /// Error and lifecycle listeners are kept.
    pub fn clear_listeners(&self) {
        // ---
        let failures: Vec<PubSubError> = {
            let mut state = lock_ignore_poison(&self.state);
            let patterns = state.topics.clear();

            patterns
                .iter()
                .filter_map(|pattern| self.release_if_unused(&mut state, pattern).err())
                .collect()
        };

        for err in failures {
            self.emit_error(err);
        }
    }

    /// Remove any listener by id, whatever it was registered for.
    pub fn off(&self, id: ListenerId) -> bool {
        // ---
        let pattern = {
            let mut state = lock_ignore_poison(&self.state);
            match state.topics.event_of(id) {
                Some(pattern) => pattern,
                None => {
                    if let Some(event) = state.errors.event_of(id) {
                        return state.errors.remove(&event, id).is_some();
                    }
                    if let Some(event) = state.signals.event_of(id) {
                        return state.signals.remove(&event, id).is_some();
                    }
                    return false;
                }
            }
        };
        self.remove_listener(&pattern, id)
    }

    /// Number of listeners currently registered for `pattern`.
    pub fn listener_count(&self, pattern: &str) -> usize {
        lock_ignore_poison(&self.state).topics.count(pattern)
    }

    /// Patterns that currently have at least one listener, sorted.
    pub fn patterns(&self) -> Vec<String> {
        lock_ignore_poison(&self.state).topics.events()
    }

    /// Patterns with an active broker subscription, sorted.
    pub fn subscribed_patterns(&self) -> Vec<String> {
        let state = lock_ignore_poison(&self.state);
        let mut patterns: Vec<String> = state.subscribed.iter().cloned().collect();
        patterns.sort();
        patterns
    }

    /// Per-pattern threshold above which a possible leak is logged.
    ///
    /// Defaults to 10; 0 disables the warning. Registration is never
    /// refused.
    pub fn set_max_listeners(&self, max: usize) {
        let mut state = lock_ignore_poison(&self.state);
        state.topics.set_max_listeners(max);
        state.errors.set_max_listeners(max);
        state.signals.set_max_listeners(max);
    }

    // --------------------
    // Publishing
    // --------------------

    /// Publish `message` as JSON to `topic` on the emitter connection.
    ///
    /// No acknowledgement is awaited; success means the connection accepted
    /// the command.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::Serialization`] if `message` cannot be encoded
    /// as JSON, or [`PubSubError::Closed`] if the emitter has been closed.
    pub fn publish<T>(&self, topic: &str, message: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        // ---
        let payload = codec::encode(message)?;
        log_debug!(self.client_id => "publish to {topic}: {payload}");
        self.emitter.publish(topic, payload)
    }

    /// Invoke the listeners of `pattern` locally, without touching the
    /// broker. Returns `true` if any listener ran.
    pub fn emit(&self, pattern: &str, payload: &Value, channel: &str) -> bool {
        // ---
        let (callbacks, failure) = {
            let mut state = lock_ignore_poison(&self.state);
            let callbacks = state.topics.take_for_emit(pattern);
            let failure = if callbacks.is_empty() {
                None
            } else {
                self.release_if_unused(&mut state, pattern).err()
            };
            (callbacks, failure)
        };

        for callback in &callbacks {
            callback(payload, channel);
        }

        if let Some(err) = failure {
            self.emit_error(err);
        }
        !callbacks.is_empty()
    }

    // --------------------
    // Inbound events
    // --------------------

    /// Feed one connection event into the adapter.
    ///
    /// Pattern messages are decoded and dispatched, connection errors are
    /// relayed to the error listeners. A [`PubSubError::Subscribe`] error
    /// also drops the pattern from the subscription registry, so the next
    /// listener registered for it issues a fresh `psubscribe`. `Ready` and
    /// `End` are aggregated by [`PubSubClient`](crate::PubSubClient) and
    /// ignored here.
    pub fn handle_event(&self, role: ConnectionRole, event: ConnectionEvent) {
        // ---
        match event {
            ConnectionEvent::PMessage {
                pattern,
                channel,
                payload,
            } => self.dispatch_message(&pattern, &channel, &payload),
            ConnectionEvent::Error(err) => {
                log_debug!(self.client_id => "{role} connection error: {err}");
                if let PubSubError::Subscribe { pattern, .. } = &err {
                    self.forget_subscription(pattern);
                }
                self.emit_error(err);
            }
            ConnectionEvent::Ready => {
                log_debug!(self.client_id => "{role} connection ready");
            }
            ConnectionEvent::End => {
                log_debug!(self.client_id => "{role} connection ended");
            }
        }
    }

    fn dispatch_message(&self, pattern: &str, channel: &str, raw: &[u8]) {
        // ---
        match codec::decode(raw) {
            Ok(payload) => {
                if !self.emit(pattern, &payload, channel) {
                    log_debug!(
                        self.client_id => "no listeners for {pattern}, dropped message on {channel}"
                    );
                }
            }
            Err(source) => self.emit_error(PubSubError::Decode {
                channel: channel.to_string(),
                payload: String::from_utf8_lossy(raw).into_owned(),
                source,
            }),
        }
    }

    // --------------------
    // Errors and lifecycle
    // --------------------

    /// Register a listener for errors from either connection and for
    /// inbound payloads that fail to decode.
    ///
    /// Without any error listener, errors are logged and otherwise dropped.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PubSubError) + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        lock_ignore_poison(&self.state)
            .errors
            .add(ERROR, id, Arc::new(listener), false);
        id
    }

    /// Register a listener for the aggregate `ready` signal, which fires
    /// once both connections are established.
    pub fn on_ready<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_signal_listener(READY, Arc::new(listener))
    }

    /// Register a listener for the aggregate `end` signal, which fires once
    /// both connections have ended.
    pub fn on_end<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_signal_listener(END, Arc::new(listener))
    }

    /// Whether the aggregate `ready` signal has fired.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether the aggregate `end` signal has fired.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Deliver `err` to every error listener.
    pub fn emit_error(&self, err: PubSubError) {
        // ---
        let callbacks = lock_ignore_poison(&self.state).errors.take_for_emit(ERROR);

        if callbacks.is_empty() {
            log_error!(self.client_id => "unhandled error: {err}");
            return;
        }
        for callback in &callbacks {
            callback(&err);
        }
    }

    pub(crate) fn emit_ready(&self) {
        self.ready.store(true, Ordering::Release);
        self.emit_signal(READY);
    }

    pub(crate) fn emit_end(&self) {
        self.ended.store(true, Ordering::Release);
        self.emit_signal(END);
    }

    fn add_signal_listener(&self, signal: &str, listener: Arc<SignalListener>) -> ListenerId {
        let id = self.next_listener_id();
        lock_ignore_poison(&self.state)
            .signals
            .add(signal, id, listener, false);
        id
    }

    fn emit_signal(&self, signal: &str) {
        let callbacks = lock_ignore_poison(&self.state).signals.take_for_emit(signal);
        log_debug!(self.client_id => "{signal} ({} listeners)", callbacks.len());
        for callback in &callbacks {
            callback();
        }
    }

    // --------------------
    // Registry bookkeeping
    // --------------------

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ensure_subscribed(&self, state: &mut State, pattern: &str) -> Result<()> {
        // ---
        if state.subscribed.contains(pattern) {
            return Ok(());
        }

        self.receiver.psubscribe(pattern)?;
        state.subscribed.insert(pattern.to_string());
        log_debug!(self.client_id => "psubscribe {pattern}");
        Ok(())
    }

    /// The receiver refused `pattern` after it was queued.
    fn forget_subscription(&self, pattern: &str) {
        if lock_ignore_poison(&self.state).subscribed.remove(pattern) {
            log_debug!(self.client_id => "{pattern} not subscribed, next listener retries");
        }
    }

    fn release_if_unused(&self, state: &mut State, pattern: &str) -> Result<()> {
        // ---
        if state.topics.count(pattern) > 0 || !state.subscribed.remove(pattern) {
            return Ok(());
        }

        log_debug!(self.client_id => "punsubscribe {pattern}");
        self.receiver.punsubscribe(pattern)
    }
}
