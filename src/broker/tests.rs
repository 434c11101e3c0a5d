use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::TopicBus;
use super::message::Event;
use super::topic::Topic;
use crate::utils::error::BusError;

#[test]
fn test_topic_new() {
    let topic: Topic<u64> = Topic::new("test_topic");
    assert_eq!(topic.name, "test_topic");
    assert!(topic.is_empty());
}

#[test]
fn test_topic_subscribe_and_unsubscribe() {
    let mut topic: Topic<u64> = Topic::new("test_topic");
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    topic.subscribe(7, tx);
    assert_eq!(topic.len(), 1);
    assert!(topic.unsubscribe(&7));
    assert!(!topic.unsubscribe(&7));
    assert!(topic.is_empty());
}

#[test]
fn test_event_serializes_camel_case() {
    let event = Event {
        current_number: 3,
        timestamp: "1700000000000".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["currentNumber"], 3);
    assert_eq!(json["timestamp"], "1700000000000");
}

#[test]
fn test_event_new_stamps_millis() {
    let event = Event::new(1);
    assert_eq!(event.current_number, 1);
    assert!(event.timestamp.parse::<i64>().unwrap() > 0);
}

#[test]
fn test_bus_subscribe_registers_listener() {
    let bus: TopicBus<u64> = TopicBus::new();
    let listener = bus.subscribe("numbers");
    assert!(listener.is_active());
    assert_eq!(listener.topic(), "numbers");
    assert_eq!(bus.listener_count("numbers"), 1);
    assert_eq!(bus.topic_count(), 1);
}

#[test]
fn test_publish_delivers_in_order() {
    let bus = TopicBus::new();
    let mut listener = bus.subscribe("numbers");

    for n in 1..=5u64 {
        assert_eq!(bus.publish("numbers", n), Ok(1));
    }

    let received: Vec<u64> = std::iter::from_fn(|| listener.try_recv())
        .map(|n| *n)
        .collect();
    assert_eq!(received, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_late_subscriber_only_sees_later_events() {
    let bus = TopicBus::new();
    let mut early = bus.subscribe("numbers");
    bus.publish("numbers", 1u64).unwrap();
    bus.publish("numbers", 2u64).unwrap();

    let mut late = bus.subscribe("numbers");
    bus.publish("numbers", 3u64).unwrap();

    let early_seen: Vec<u64> = std::iter::from_fn(|| early.try_recv()).map(|n| *n).collect();
    let late_seen: Vec<u64> = std::iter::from_fn(|| late.try_recv()).map(|n| *n).collect();
    assert_eq!(early_seen, vec![1, 2, 3]);
    assert_eq!(late_seen, vec![3]);
}

#[test]
fn test_publish_without_listeners_is_noop() {
    let bus: TopicBus<u64> = TopicBus::new();
    assert_eq!(bus.publish("nobody", 1), Ok(0));
    assert_eq!(bus.topic_count(), 0);
}

#[test]
fn test_topics_are_isolated() {
    let bus = TopicBus::new();
    let mut a = bus.subscribe("a");
    let mut b = bus.subscribe("b");

    bus.publish("a", 1u64).unwrap();

    assert_eq!(a.try_recv().map(|n| *n), Some(1));
    assert!(b.try_recv().is_none());
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let bus = TopicBus::new();
    let mut listener = bus.subscribe("numbers");
    bus.publish("numbers", 1u64).unwrap();

    bus.unsubscribe(&mut listener);
    assert!(!listener.is_active());
    assert_eq!(bus.listener_count("numbers"), 0);

    assert_eq!(bus.publish("numbers", 2u64), Ok(0));
    // queued events are discarded on unsubscribe too
    assert!(listener.try_recv().is_none());
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let bus: TopicBus<u64> = TopicBus::new();
    let mut listener = bus.subscribe("numbers");
    let _other = bus.subscribe("numbers");

    bus.unsubscribe(&mut listener);
    bus.unsubscribe(&mut listener);
    listener.unsubscribe();

    assert_eq!(bus.listener_count("numbers"), 1);
}

#[test]
fn test_drop_unregisters_and_prunes_topic() {
    let bus: TopicBus<u64> = TopicBus::new();
    let listener = bus.subscribe("numbers");
    assert_eq!(bus.topic_count(), 1);

    drop(listener);
    assert_eq!(bus.listener_count("numbers"), 0);
    assert_eq!(bus.topic_count(), 0);
}

#[test]
fn test_full_listener_drops_only_its_copy() {
    let bus = TopicBus::with_capacity(1);
    let mut slow = bus.subscribe("numbers");
    let mut fast = bus.subscribe("numbers");

    assert_eq!(bus.publish("numbers", 1u64), Ok(2));
    assert_eq!(fast.try_recv().map(|n| *n), Some(1));

    // slow still holds event 1, so event 2 is dropped for it alone
    assert_eq!(bus.publish("numbers", 2u64), Ok(1));
    assert_eq!(fast.try_recv().map(|n| *n), Some(2));
    assert_eq!(slow.try_recv().map(|n| *n), Some(1));
    assert!(slow.try_recv().is_none());

    // once drained it receives again
    assert_eq!(bus.publish("numbers", 3u64), Ok(2));
    assert_eq!(slow.try_recv().map(|n| *n), Some(3));
}

#[test]
fn test_events_are_shared_not_copied() {
    let bus = TopicBus::new();
    let mut a = bus.subscribe("events");
    let mut b = bus.subscribe("events");

    bus.publish("events", Event::new(9)).unwrap();

    let from_a = a.try_recv().unwrap();
    let from_b = b.try_recv().unwrap();
    assert!(Arc::ptr_eq(&from_a, &from_b));
}

#[test]
fn test_close_ends_listeners_and_rejects_publish() {
    let bus = TopicBus::new();
    let mut listener = bus.subscribe("numbers");

    bus.close();
    assert!(bus.is_closed());
    assert_eq!(bus.topic_count(), 0);
    assert_eq!(bus.publish("numbers", 1u64), Err(BusError::Closed));
    assert!(listener.try_recv().is_none());

    let mut after = bus.subscribe("numbers");
    assert!(!after.is_active());
    assert!(after.try_recv().is_none());
    assert_eq!(bus.listener_count("numbers"), 0);
}

#[tokio::test]
async fn test_listener_stream_ends_after_close() {
    let bus = TopicBus::new();
    let mut listener = bus.subscribe("numbers");
    bus.publish("numbers", 1u64).unwrap();
    bus.close();

    assert_eq!(listener.next().await.map(|n| *n), Some(1));
    assert!(listener.next().await.is_none());
}

#[tokio::test]
async fn test_hundred_subscribers_receive_every_event_once() {
    let bus = TopicBus::with_capacity(128);
    let listeners: Vec<_> = (0..100).map(|_| bus.subscribe("numbers")).collect();

    let handles: Vec<_> = listeners
        .into_iter()
        .map(|listener| {
            tokio::spawn(async move {
                listener
                    .take(50)
                    .map(|n| *n)
                    .collect::<Vec<u64>>()
                    .await
            })
        })
        .collect();

    for n in 1..=50u64 {
        assert_eq!(bus.publish("numbers", n), Ok(100));
    }

    let expected: Vec<u64> = (1..=50).collect();
    for handle in handles {
        let received = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber timed out")
            .unwrap();
        assert_eq!(received, expected);
    }
    assert_eq!(bus.listener_count("numbers"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_and_unsubscribe_keep_registry_consistent() {
    let bus: TopicBus<u64> = TopicBus::with_capacity(4);

    let publisher = {
        let bus = bus.clone();
        tokio::spawn(async move {
            for n in 0..500u64 {
                bus.publish("numbers", n).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let churners: Vec<_> = (0..8)
        .map(|_| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let mut listener = bus.subscribe("numbers");
                    tokio::task::yield_now().await;
                    listener.unsubscribe();
                }
            })
        })
        .collect();

    publisher.await.unwrap();
    for churner in churners {
        churner.await.unwrap();
    }

    assert_eq!(bus.listener_count("numbers"), 0);
    assert_eq!(bus.topic_count(), 0);
}
