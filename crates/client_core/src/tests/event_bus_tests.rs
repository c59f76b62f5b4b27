use super::*;
use serde_json::json;
use shared::protocol::{Echo, ProgressStep, ECHO};
use std::sync::Mutex;

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Value) + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let make = move |tag: &str| {
        let sink = Arc::clone(&sink);
        let tag = tag.to_string();
        Box::new(move |payload: &Value| {
            sink.lock().expect("lock").push(format!("{tag}:{payload}"));
        }) as Box<dyn Fn(&Value) + Send + Sync>
    };
    (seen, make)
}

#[test]
fn delivers_to_subscribers_in_subscription_order() {
    let bus = EventBus::new();
    let (seen, make) = recorder();
    bus.subscribe("job", make("first"));
    bus.subscribe("job", make("second"));
    bus.subscribe("other", make("unrelated"));
    bus.subscribe("job", make("third"));

    let delivered = bus.publish("job", &json!(7));

    assert_eq!(delivered, 3);
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["first:7", "second:7", "third:7"]
    );
}

#[test]
fn publishing_unknown_event_is_a_noop() {
    let bus = EventBus::new();
    assert_eq!(bus.publish("nobody.listens", &Value::Null), 0);
    assert_eq!(bus.subscriber_count("nobody.listens"), 0);
}

#[test]
fn panicking_subscriber_does_not_block_later_ones() {
    let bus = EventBus::new();
    let (seen, make) = recorder();
    bus.subscribe("job", make("before"));
    bus.subscribe("job", |_| panic!("subscriber blew up"));
    bus.subscribe("job", make("after"));

    let delivered = bus.publish("job", &json!("x"));

    assert_eq!(delivered, 2);
    assert_eq!(
        *seen.lock().expect("lock"),
        vec![r#"before:"x""#, r#"after:"x""#]
    );

    // The bus stays usable after a subscriber panicked.
    assert_eq!(bus.publish("job", &json!("y")), 2);
}

#[test]
fn frame_events_dispatch_in_wire_order() {
    let bus = EventBus::new();
    let (seen, make) = recorder();
    bus.subscribe("b", make("b"));
    bus.subscribe("a", make("a"));
    bus.subscribe("c", make("c"));

    let frame = Frame::decode(r#"{"c": 1, "a": 2, "b": 3}"#)
        .expect("decode")
        .expect("frame");
    bus.dispatch_frame(&frame);

    assert_eq!(*seen.lock().expect("lock"), vec!["c:1", "a:2", "b:3"]);
}

#[test]
fn typed_subscribers_skip_mismatched_payloads() {
    let bus = EventBus::new();
    let steps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&steps);
    bus.subscribe_typed::<ProgressStep, _>(move |value| sink.lock().expect("lock").push(value));

    bus.publish("progressbar.step", &json!(12));
    bus.publish("progressbar.step", &json!("not a number"));
    bus.publish("progressbar.step", &json!(99.5));

    assert_eq!(*steps.lock().expect("lock"), vec![12.0, 99.5]);
}

#[test]
fn typed_publish_reaches_raw_subscribers() {
    let bus = EventBus::new();
    let (seen, make) = recorder();
    bus.subscribe(ECHO, make("raw"));

    bus.publish_typed::<Echo>(&"hello\n".to_string());

    assert_eq!(*seen.lock().expect("lock"), vec![r#"raw:"hello\n""#]);
}

#[test]
fn subscribers_may_subscribe_during_dispatch() {
    let bus = Arc::new(EventBus::new());
    let inner = Arc::clone(&bus);
    bus.subscribe("boot", move |_| inner.subscribe("late", |_| {}));

    bus.publish("boot", &Value::Null);

    assert_eq!(bus.subscriber_count("late"), 1);
}
