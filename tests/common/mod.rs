// tests/common/mod.rs

//! Spy connections that record every broker command.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use redis_pubsub::{
    // ---
    ConnectionBase,
    ConnectionRole,
    PatternSubscriber,
    PubSubError,
    Publisher,
    PublisherPtr,
    RedisPubSub,
    Result,
    SubscriberPtr,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    PSubscribe(String),
    PUnsubscribe(String),
}

pub struct SpyPublisher {
    base: ConnectionBase,
    published: Mutex<Vec<(String, String)>>,
}

impl SpyPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: ConnectionBase::new("spy", ConnectionRole::Emitter),
            published: Mutex::new(Vec::new()),
        })
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Publisher for SpyPublisher {
    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn publish(&self, channel: &str, payload: String) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct SpySubscriber {
    base: ConnectionBase,
    calls: Mutex<Vec<BrokerCall>>,
    reject: Mutex<bool>,
}

impl SpySubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: ConnectionBase::new("spy", ConnectionRole::Receiver),
            calls: Mutex::new(Vec::new()),
            reject: Mutex::new(false),
        })
    }

    /// Make every following command fail as if the connection were closed.
    pub fn reject_commands(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn psubscribes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::PSubscribe(p) => Some(p),
                BrokerCall::PUnsubscribe(_) => None,
            })
            .collect()
    }

    pub fn punsubscribes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::PUnsubscribe(p) => Some(p),
                BrokerCall::PSubscribe(_) => None,
            })
            .collect()
    }

    fn record(&self, call: BrokerCall) -> Result<()> {
        if *self.reject.lock().unwrap() {
            return Err(PubSubError::Closed);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait::async_trait]
impl PatternSubscriber for SpySubscriber {
    fn base(&self) -> &ConnectionBase {
        &self.base
    }

    fn psubscribe(&self, pattern: &str) -> Result<()> {
        self.record(BrokerCall::PSubscribe(pattern.to_string()))
    }

    fn punsubscribe(&self, pattern: &str) -> Result<()> {
        self.record(BrokerCall::PUnsubscribe(pattern.to_string()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Fixture {
    pub emitter: Arc<SpyPublisher>,
    pub receiver: Arc<SpySubscriber>,
    pub pubsub: RedisPubSub,
}

pub fn fixture() -> Fixture {
    init_logging();

    let emitter = SpyPublisher::new();
    let receiver = SpySubscriber::new();

    let emitter_ptr: PublisherPtr = emitter.clone();
    let receiver_ptr: SubscriberPtr = receiver.clone();

    Fixture {
        emitter,
        receiver,
        pubsub: RedisPubSub::new(emitter_ptr, receiver_ptr),
    }
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
