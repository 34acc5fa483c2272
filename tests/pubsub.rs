// tests/pubsub.rs

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{json, Value};

use common::{fixture, BrokerCall};
use redis_pubsub::{ConnectionEvent, ConnectionRole, PubSubError};

type Seen = Arc<Mutex<Vec<(Value, String)>>>;

fn recorder() -> (Seen, impl Fn(&Value, &str) + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |payload: &Value, channel: &str| {
        sink.lock()
            .unwrap()
            .push((payload.clone(), channel.to_string()));
    };
    (seen, listener)
}

fn error_recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&PubSubError) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |err: &PubSubError| sink.lock().unwrap().push(err.to_string());
    (seen, listener)
}

fn pmessage(pattern: &str, channel: &str, payload: &'static str) -> ConnectionEvent {
    ConnectionEvent::PMessage {
        pattern: pattern.to_string(),
        channel: channel.to_string(),
        payload: Bytes::from_static(payload.as_bytes()),
    }
}

#[test]
fn publishes_json_on_the_emitter() {
    let f = fixture();

    f.pubsub
        .publish("test.topic", &json!({"foo": "bar"}))
        .expect("publish failed");

    assert_eq!(
        f.emitter.published(),
        vec![("test.topic".to_string(), r#"{"foo":"bar"}"#.to_string())]
    );
    assert!(f.receiver.calls().is_empty());
}

#[test]
fn publish_fails_for_unserializable_message() {
    let f = fixture();

    let mut message = BTreeMap::new();
    message.insert(vec![1u8, 2], "value");

    let result = f.pubsub.publish("test.topic", &message);

    assert!(matches!(result, Err(PubSubError::Serialization(_))));
    assert!(f.emitter.published().is_empty());
}

#[test]
fn subscribes_on_first_listener_of_each_pattern() {
    let f = fixture();

    f.pubsub.on("test.topic.1.*", |_, _| {});
    f.pubsub.on("test.topic.2.*", |_, _| {});

    assert_eq!(
        f.receiver.psubscribes(),
        vec!["test.topic.1.*".to_string(), "test.topic.2.*".to_string()]
    );
}

#[test]
fn subscribes_only_once_per_pattern() {
    let f = fixture();

    for _ in 0..5 {
        f.pubsub.on("test.topic.1.*", |_, _| {});
    }
    f.pubsub.once("test.topic.1.*", |_, _| {});

    assert_eq!(f.receiver.psubscribes().len(), 1);
    assert_eq!(f.pubsub.listener_count("test.topic.1.*"), 6);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["test.topic.1.*".to_string()]);
}

#[test]
fn keeps_subscription_while_a_listener_remains() {
    let f = fixture();

    let first = f.pubsub.on("test.topic.1.*", |_, _| {});
    let second = f.pubsub.on("test.topic.1.*", |_, _| {});
    let other = f.pubsub.on("test.topic.2.*", |_, _| {});

    // unknown listener, and a listener registered under another pattern
    assert!(!f.pubsub.remove_listener("test.topic.1.*", other));
    assert!(f.pubsub.remove_listener("test.topic.1.*", first));

    assert!(f.receiver.punsubscribes().is_empty());
    assert_eq!(f.pubsub.listener_count("test.topic.1.*"), 1);

    assert!(f.pubsub.remove_listener("test.topic.1.*", second));
    assert_eq!(f.receiver.punsubscribes(), vec!["test.topic.1.*".to_string()]);
}

#[test]
fn unsubscribes_when_last_listener_is_removed() {
    let f = fixture();

    let id = f.pubsub.on("test.topic.1.*", |_, _| {});
    f.pubsub.remove_listener("test.topic.1.*", id);

    assert_eq!(
        f.receiver.calls(),
        vec![
            BrokerCall::PSubscribe("test.topic.1.*".to_string()),
            BrokerCall::PUnsubscribe("test.topic.1.*".to_string()),
        ]
    );
    assert!(f.pubsub.subscribed_patterns().is_empty());

    // removing again is a no-op
    assert!(!f.pubsub.remove_listener("test.topic.1.*", id));
    assert_eq!(f.receiver.punsubscribes().len(), 1);
}

#[test]
fn remove_all_unsubscribes_exactly_once() {
    let f = fixture();

    f.pubsub.on("test.topic.1.*", |_, _| {});
    f.pubsub.on("test.topic.1.*", |_, _| {});

    assert_eq!(f.pubsub.remove_all_listeners("test.topic.1.*"), 2);
    assert_eq!(f.pubsub.remove_all_listeners("test.topic.1.*"), 0);

    assert_eq!(f.receiver.punsubscribes(), vec!["test.topic.1.*".to_string()]);
}

#[test]
fn resubscribes_after_pattern_was_released() {
    let f = fixture();

    let id = f.pubsub.on("a.*", |_, _| {});
    f.pubsub.remove_listener("a.*", id);
    f.pubsub.on("a.*", |_, _| {});

    assert_eq!(f.receiver.psubscribes(), vec!["a.*".to_string(), "a.*".to_string()]);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["a.*".to_string()]);
}

#[test]
fn off_and_clear_release_patterns() {
    let f = fixture();

    let a = f.pubsub.on("a.*", |_, _| {});
    f.pubsub.on("b.*", |_, _| {});
    f.pubsub.on("c.*", |_, _| {});

    assert!(f.pubsub.off(a));
    assert_eq!(f.receiver.punsubscribes(), vec!["a.*".to_string()]);

    f.pubsub.clear_listeners();

    let mut released = f.receiver.punsubscribes();
    released.sort();
    assert_eq!(released, vec!["a.*", "b.*", "c.*"]);
    assert!(f.pubsub.patterns().is_empty());
    assert!(f.pubsub.subscribed_patterns().is_empty());
}

#[test]
fn delivers_decoded_payload_and_channel() {
    let f = fixture();
    let (seen, listener) = recorder();

    f.pubsub.on("test.topic.1.*", listener);
    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        pmessage("test.topic.1.*", "test.topic.1.test", r#"{"foo":"bar"}"#),
    );

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(json!({"foo": "bar"}), "test.topic.1.test".to_string())]
    );
}

#[test]
fn dispatches_by_matched_pattern_only() {
    let f = fixture();
    let (one, listener_one) = recorder();
    let (two, listener_two) = recorder();

    f.pubsub.on("test.topic.1.*", listener_one);
    f.pubsub.on("test.topic.2.*", listener_two);

    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        pmessage("test.topic.2.*", "test.topic.2.x", "7"),
    );

    assert!(one.lock().unwrap().is_empty());
    assert_eq!(*two.lock().unwrap(), vec![(json!(7), "test.topic.2.x".to_string())]);
}

#[test]
fn null_payload_decodes_to_null() {
    let f = fixture();
    let (seen, listener) = recorder();

    f.pubsub.on("t.*", listener);
    f.pubsub
        .handle_event(ConnectionRole::Receiver, pmessage("t.*", "t.1", "null"));

    assert_eq!(*seen.lock().unwrap(), vec![(Value::Null, "t.1".to_string())]);
}

#[test]
fn once_unsubscribes_after_its_message() {
    let f = fixture();
    let (seen, listener) = recorder();

    f.pubsub.once("test.topic.1.*", listener);
    assert!(f.receiver.punsubscribes().is_empty());

    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        pmessage("test.topic.1.*", "test.topic.1.test", "{}"),
    );
    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        pmessage("test.topic.1.*", "test.topic.1.test", "{}"),
    );

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(f.receiver.punsubscribes(), vec!["test.topic.1.*".to_string()]);
}

#[test]
fn once_keeps_subscription_shared_with_plain_listeners() {
    let f = fixture();
    let (once_seen, once_listener) = recorder();
    let (plain_seen, plain_listener) = recorder();

    f.pubsub.once("t.*", once_listener);
    f.pubsub.on("t.*", plain_listener);

    for _ in 0..2 {
        f.pubsub
            .handle_event(ConnectionRole::Receiver, pmessage("t.*", "t.x", "1"));
    }

    assert_eq!(once_seen.lock().unwrap().len(), 1);
    assert_eq!(plain_seen.lock().unwrap().len(), 2);
    assert!(f.receiver.punsubscribes().is_empty());
    assert_eq!(f.pubsub.listener_count("t.*"), 1);
}

#[test]
fn listener_may_remove_itself() {
    let f = fixture();
    let pubsub = Arc::new(f.pubsub);
    let calls = Arc::new(Mutex::new(0));

    let id_slot = Arc::new(Mutex::new(None));
    let id = {
        let handle = Arc::clone(&pubsub);
        let calls = Arc::clone(&calls);
        let id_slot = Arc::clone(&id_slot);
        pubsub.on("self.*", move |_, _| {
            *calls.lock().unwrap() += 1;
            let id = *id_slot.lock().unwrap();
            if let Some(id) = id {
                handle.remove_listener("self.*", id);
            }
        })
    };
    *id_slot.lock().unwrap() = Some(id);

    pubsub.handle_event(ConnectionRole::Receiver, pmessage("self.*", "self.a", "1"));
    pubsub.handle_event(ConnectionRole::Receiver, pmessage("self.*", "self.a", "1"));

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(f.receiver.punsubscribes(), vec!["self.*".to_string()]);
}

#[test]
fn emit_dispatches_locally_without_publishing() {
    let f = fixture();
    let (seen, listener) = recorder();

    f.pubsub.on("local.*", listener);

    assert!(f.pubsub.emit("local.*", &json!({"n": 1}), "local.x"));
    assert!(!f.pubsub.emit("nobody.*", &json!(null), "nobody.x"));

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(f.emitter.published().is_empty());
}

#[test]
fn passes_connection_errors_through() {
    let f = fixture();
    let (errors, listener) = error_recorder();

    f.pubsub.on_error(listener);

    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        ConnectionEvent::Error(PubSubError::Transport("test".into())),
    );
    assert_eq!(*errors.lock().unwrap(), vec!["transport error: test".to_string()]);

    f.pubsub.handle_event(
        ConnectionRole::Emitter,
        ConnectionEvent::Error(PubSubError::ConnectionLost(ConnectionRole::Emitter)),
    );
    assert_eq!(errors.lock().unwrap().len(), 2);
    assert_eq!(errors.lock().unwrap()[1], "emitter connection lost");
}

#[test]
fn undecodable_payload_is_reported_as_error() {
    let f = fixture();
    let (seen, listener) = recorder();
    let decode_errors = Arc::new(Mutex::new(Vec::new()));

    f.pubsub.on("t.*", listener);
    {
        let decode_errors = Arc::clone(&decode_errors);
        f.pubsub.on_error(move |err| {
            if let PubSubError::Decode {
                channel, payload, ..
            } = err
            {
                decode_errors
                    .lock()
                    .unwrap()
                    .push((channel.clone(), payload.clone()));
            }
        });
    }

    f.pubsub
        .handle_event(ConnectionRole::Receiver, pmessage("t.*", "t.bad", "{oops"));

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(
        *decode_errors.lock().unwrap(),
        vec![("t.bad".to_string(), "{oops".to_string())]
    );
}

#[test]
fn unhandled_errors_do_not_panic() {
    let f = fixture();

    f.pubsub
        .handle_event(ConnectionRole::Receiver, pmessage("t.*", "t.bad", "{oops"));
    f.pubsub.handle_event(
        ConnectionRole::Emitter,
        ConnectionEvent::Error(PubSubError::Closed),
    );
}

#[test]
fn lifecycle_listeners_never_touch_the_broker() {
    let f = fixture();

    let error_id = f.pubsub.on_error(|_| {});
    f.pubsub.on_ready(|| {});
    f.pubsub.on_end(|| {});

    assert!(f.receiver.calls().is_empty());
    assert!(f.pubsub.patterns().is_empty());

    assert!(f.pubsub.off(error_id));
    assert!(!f.pubsub.off(error_id));
    assert!(f.receiver.calls().is_empty());
}

#[test]
fn failed_psubscribe_is_reported_and_retried() {
    let f = fixture();
    let (errors, listener) = error_recorder();
    f.pubsub.on_error(listener);

    f.receiver.reject_commands(true);
    f.pubsub.on("t.*", |_, _| {});

    assert_eq!(*errors.lock().unwrap(), vec!["connection closed".to_string()]);
    assert!(f.pubsub.subscribed_patterns().is_empty());
    assert_eq!(f.pubsub.listener_count("t.*"), 1);

    f.receiver.reject_commands(false);
    f.pubsub.on("t.*", |_, _| {});

    assert_eq!(f.receiver.psubscribes(), vec!["t.*".to_string()]);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["t.*".to_string()]);
}

#[test]
fn refused_subscription_is_forgotten_and_retried() {
    let f = fixture();
    let (errors, listener) = error_recorder();
    f.pubsub.on_error(listener);

    f.pubsub.on("t.*", |_, _| {});
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["t.*".to_string()]);

    // the receiver queued the command, then the server refused it
    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        ConnectionEvent::Error(PubSubError::Subscribe {
            pattern: "t.*".into(),
            source: Box::new(PubSubError::Transport("ERR bad pattern".into())),
        }),
    );

    assert_eq!(
        *errors.lock().unwrap(),
        vec!["failed to subscribe to t.*: transport error: ERR bad pattern".to_string()]
    );
    assert!(f.pubsub.subscribed_patterns().is_empty());
    assert_eq!(f.pubsub.listener_count("t.*"), 1);

    f.pubsub.on("t.*", |_, _| {});

    assert_eq!(f.receiver.psubscribes(), vec!["t.*", "t.*"]);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["t.*".to_string()]);
}

#[test]
fn refusal_of_unknown_pattern_is_only_reported() {
    let f = fixture();
    let (errors, listener) = error_recorder();
    f.pubsub.on_error(listener);
    f.pubsub.on("a.*", |_, _| {});

    f.pubsub.handle_event(
        ConnectionRole::Receiver,
        ConnectionEvent::Error(PubSubError::Subscribe {
            pattern: "b.*".into(),
            source: Box::new(PubSubError::Closed),
        }),
    );

    assert_eq!(errors.lock().unwrap().len(), 1);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["a.*".to_string()]);
}

#[test]
fn clear_releases_only_subscribed_patterns() {
    let f = fixture();

    f.pubsub.on("a.*", |_, _| {});
    f.receiver.reject_commands(true);
    f.pubsub.on("b.*", |_, _| {});
    f.receiver.reject_commands(false);

    assert_eq!(f.pubsub.patterns(), vec!["a.*", "b.*"]);
    assert_eq!(f.pubsub.subscribed_patterns(), vec!["a.*".to_string()]);

    f.pubsub.clear_listeners();

    assert_eq!(f.receiver.punsubscribes(), vec!["a.*".to_string()]);
    assert!(f.pubsub.patterns().is_empty());
}

#[test]
fn signals_are_not_dispatched_by_handle_event() {
    let f = fixture();
    let ready = Arc::new(Mutex::new(0));
    {
        let ready = Arc::clone(&ready);
        f.pubsub.on_ready(move || *ready.lock().unwrap() += 1);
    }

    f.pubsub
        .handle_event(ConnectionRole::Emitter, ConnectionEvent::Ready);
    f.pubsub
        .handle_event(ConnectionRole::Receiver, ConnectionEvent::Ready);

    assert_eq!(*ready.lock().unwrap(), 0);
    assert!(!f.pubsub.is_ready());
}

#[test]
fn max_listeners_only_warns() {
    let f = fixture();
    f.pubsub.set_max_listeners(1);

    f.pubsub.on("busy.*", |_, _| {});
    f.pubsub.on("busy.*", |_, _| {});
    f.pubsub.on("busy.*", |_, _| {});

    assert_eq!(f.pubsub.listener_count("busy.*"), 3);
    assert_eq!(f.receiver.psubscribes().len(), 1);
}
