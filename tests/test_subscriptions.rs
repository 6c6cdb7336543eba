//! Integration tests for subscribing, dispatch and publishing through a supervisor

mod test_helpers;

use linkkeeper::transport::InboundMessage;
use linkkeeper::{LinkError, LinkSettings};
use std::cell::RefCell;
use std::rc::Rc;
use test_helpers::Harness;

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_message_dispatched_to_every_matching_handler_in_order() {
    let mut harness = Harness::new();
    harness.connect();
    let seen = log();

    let sink = seen.clone();
    harness
        .link
        .subscribe_with_topic("sensors/#", move |topic, payload| {
            sink.borrow_mut().push(format!("all {topic}={payload}"))
        })
        .unwrap();
    let sink = seen.clone();
    harness
        .link
        .subscribe("sensors/+/temp", move |payload| sink.borrow_mut().push(format!("temp {payload}")))
        .unwrap();
    let sink = seen.clone();
    harness
        .link
        .subscribe("lights/porch", move |payload| sink.borrow_mut().push(format!("porch {payload}")))
        .unwrap();

    harness.session.push_message("sensors/attic/temp", "19");
    harness.session.push_message("sensors/attic/humidity", "40");
    harness.session.push_message("lights/porch", "on");
    harness.session.push_message("doors/front", "closed");
    harness.link.tick();

    assert_eq!(
        *seen.borrow(),
        vec![
            "all sensors/attic/temp=19".to_string(),
            "temp 19".to_string(),
            "all sensors/attic/humidity=40".to_string(),
            "porch on".to_string(),
        ]
    );

    let metrics = harness.link.metrics().messages;
    assert_eq!(metrics.received, 4);
    assert_eq!(metrics.dispatched, 4);
}

#[test]
fn test_duplicate_subscription_is_rejected_without_wire_traffic() {
    let mut harness = Harness::new();
    harness.connect();

    harness.link.subscribe("a/b", |_| {}).unwrap();
    let err = harness.link.subscribe("a/b", |_| {}).unwrap_err();

    assert!(matches!(err, LinkError::DuplicateSubscription { ref pattern } if pattern == "a/b"));
    assert_eq!(harness.session.wire_subscriptions(), vec!["a/b".to_string()]);
    assert_eq!(harness.link.subscriptions().len(), 1);
}

#[test]
fn test_subscription_capacity_is_enforced() {
    let mut harness = Harness::with_settings(LinkSettings::new("test-device").with_capacities(2, 10));
    harness.connect();

    harness.link.subscribe("a", |_| {}).unwrap();
    harness.link.subscribe("b", |_| {}).unwrap();
    let err = harness.link.subscribe("c", |_| {}).unwrap_err();

    assert!(matches!(err, LinkError::CapacityExceeded { capacity: 2, .. }));
    assert_eq!(harness.session.wire_subscriptions().len(), 2);

    // Freed slot can be reused
    harness.link.unsubscribe("a").unwrap();
    harness.link.subscribe("c", |_| {}).unwrap();
    let patterns: Vec<&str> = harness.link.subscriptions().patterns().collect();
    assert_eq!(patterns, vec!["b", "c"]);
}

#[test]
fn test_subscribe_without_session_records_nothing() {
    let mut harness = Harness::new();

    let err = harness.link.subscribe("a/#", |_| {}).unwrap_err();
    assert!(matches!(err, LinkError::SubscribeFailed { .. }));
    assert!(harness.link.subscriptions().is_empty());
}

#[test]
fn test_wire_subscribe_failure_leaves_table_unchanged() {
    let mut harness = Harness::new();
    harness.connect();
    harness.session.set_fail_subscribe(true);

    assert!(harness.link.subscribe("a/#", |_| {}).is_err());
    assert!(!harness.link.subscriptions().contains("a/#"));
}

#[test]
fn test_unsubscribe_unknown_pattern_is_not_found() {
    let mut harness = Harness::new();
    harness.connect();

    let err = harness.link.unsubscribe("never/subscribed").unwrap_err();
    assert!(matches!(err, LinkError::NotFound { .. }));
    assert!(harness.session.wire_unsubscriptions().is_empty());
}

#[test]
fn test_unsubscribe_removes_locally_even_when_wire_fails() {
    let mut harness = Harness::new();
    harness.connect();
    let seen = log();

    let sink = seen.clone();
    harness
        .link
        .subscribe("a/b", move |payload| sink.borrow_mut().push(payload.to_string()))
        .unwrap();
    harness.session.set_fail_unsubscribe(true);

    let err = harness.link.unsubscribe("a/b").unwrap_err();
    assert!(matches!(err, LinkError::UnsubscribeFailed { .. }));
    assert!(!harness.link.subscriptions().contains("a/b"));

    harness.session.push_message("a/b", "late");
    harness.link.tick();
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_unsubscribe_keeps_remaining_order() {
    let mut harness = Harness::new();
    harness.connect();

    for pattern in ["one", "two", "three"] {
        harness.link.subscribe(pattern, |_| {}).unwrap();
    }
    harness.link.unsubscribe("two").unwrap();

    let patterns: Vec<&str> = harness.link.subscriptions().patterns().collect();
    assert_eq!(patterns, vec!["one", "three"]);
    assert_eq!(harness.session.wire_unsubscriptions(), vec!["two".to_string()]);
}

#[test]
fn test_truncated_message_is_still_delivered() {
    let mut harness = Harness::new();
    harness.connect();
    let seen = log();

    let sink = seen.clone();
    harness
        .link
        .subscribe("big", move |payload| sink.borrow_mut().push(payload.to_string()))
        .unwrap();

    let message = InboundMessage::within_budget("big", vec![b'x'; 300], 64);
    assert!(message.is_truncated());
    let delivered = message.payload.len();
    harness.session.push_inbound(message);
    harness.link.tick();

    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].len(), delivered);
    assert_eq!(harness.link.metrics().messages.truncated, 1);
}

#[test]
fn test_publish_requires_a_session() {
    let mut harness = Harness::new();

    let err = harness.link.publish("a/b", "x", false).unwrap_err();
    assert!(matches!(err, LinkError::PublishFailed { ref topic } if topic == "a/b"));

    harness.connect();
    harness.link.publish("a/b", b"x".as_slice(), true).unwrap();
    assert_eq!(
        harness.session.published(),
        vec![("a/b".to_string(), b"x".to_vec(), true)]
    );

    let metrics = harness.link.metrics().messages;
    assert_eq!(metrics.published, 1);
    assert_eq!(metrics.publish_failures, 1);
}

#[test]
fn test_handler_can_observe_shared_state_across_messages() {
    let mut harness = Harness::new();
    harness.connect();
    let count = Rc::new(RefCell::new(0u32));

    let counter = count.clone();
    harness
        .link
        .subscribe("counter/+", move |_| *counter.borrow_mut() += 1)
        .unwrap();

    for i in 0..5 {
        harness.session.push_message(&format!("counter/{i}"), "tick");
    }
    harness.session.push_message("counter/a/b", "too deep");
    harness.link.tick();

    assert_eq!(*count.borrow(), 5);
}
