//! Subscription delivery and shutdown

use std::sync::Arc;
use std::time::Duration;

use athena_monitor::connection::mock::{MockDialer, MockExchange};
use athena_monitor::health::{MonitorState, Observation, ServerKind, SubscribeError, TryRecvError};

use crate::{next_description, start_monitor};

#[tokio::test(start_paused = true)]
async fn test_new_subscriber_sees_current_description_first() {
    let dialer = MockDialer::new();
    dialer.set_default_exchange(MockExchange::primary());
    let monitor = start_monitor(&dialer, Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let current = monitor.description();
    assert_eq!(current.kind(), ServerKind::RsPrimary);

    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();
    let first = next_description(&mut mailbox).await;
    assert!(Arc::ptr_eq(&first, &current));

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_subscriber_only_sees_latest() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(1));
    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();

    // Five heartbeats without reading
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(dialer.exchanges().len(), 5);

    let held = mailbox.try_recv().unwrap();
    assert!(Arc::ptr_eq(&held, &monitor.description()));
    assert_eq!(mailbox.try_recv(), Err(TryRecvError::Empty));

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_descriptions_arrive_in_order() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(1));
    let (mut mailbox, _unsub) = monitor.subscribe().unwrap();
    next_description(&mut mailbox).await;

    // One description per heartbeat, delivered as each one completes
    let mut last = next_description(&mut mailbox).await;
    assert_eq!(dialer.exchanges().len(), 1);
    for i in 2..=5 {
        let desc = next_description(&mut mailbox).await;
        assert_eq!(dialer.exchanges().len(), i);
        assert!(!Arc::ptr_eq(&desc, &last));
        last = desc;
    }

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_mailbox_stops_receiving() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(1));
    let (mut kept, _keep) = monitor.subscribe().unwrap();
    let (mut dropped, unsub) = monitor.subscribe().unwrap();
    assert!(dropped.id() > kept.id());

    next_description(&mut kept).await;
    next_description(&mut dropped).await;

    unsub.unsubscribe();
    unsub.unsubscribe();
    assert!(dropped.recv().await.is_none());

    // The other subscriber is unaffected
    let desc = next_description(&mut kept).await;
    assert!(!matches!(desc.observation, Observation::Unchecked));

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_everything() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(1));
    let (mut a, unsub_a) = monitor.subscribe().unwrap();
    let (mut b, _unsub_b) = monitor.subscribe().unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    monitor.stop();

    // Drain whatever was pending, then the mailboxes report closed
    while a.recv().await.is_some() {}
    while b.recv().await.is_some() {}

    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert_eq!(monitor.subscribe().err(), Some(SubscribeError::Closed));

    let heartbeats = dialer.exchanges().len();
    monitor.request_immediate_check();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(dialer.exchanges().len(), heartbeats);

    // Late unsubscribe and repeated stop are harmless
    unsub_a.unsubscribe();
    monitor.stop();
    monitor.shutdown().await;
}
