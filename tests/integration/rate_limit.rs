//! Heartbeat scheduling and rate limiting

use std::time::Duration;

use athena_monitor::connection::mock::MockDialer;
use athena_monitor::health::MIN_HEARTBEAT_INTERVAL;

use crate::start_monitor;

#[tokio::test(start_paused = true)]
async fn test_immediate_check_storm_is_rate_limited() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(60));

    // 40 requests over one second
    for _ in 0..40 {
        monitor.request_immediate_check();
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let exchanges = dialer.exchanges();
    assert!(
        (2..=3).contains(&exchanges.len()),
        "expected 2-3 heartbeats, got {}",
        exchanges.len()
    );
    for pair in exchanges.windows(2) {
        assert!(pair[1].started_at - pair[0].started_at >= MIN_HEARTBEAT_INTERVAL);
    }

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_requests_coalesce() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(60));

    // Let the initial heartbeat run
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dialer.exchanges().len(), 1);

    for _ in 0..100 {
        monitor.request_immediate_check();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    // The first request wakes the loop and the other 99 merge into one
    // pending request, which waits out the minimum spacing
    let exchanges = dialer.exchanges();
    assert_eq!(exchanges.len(), 3);
    assert_eq!(
        exchanges[2].started_at - exchanges[1].started_at,
        MIN_HEARTBEAT_INTERVAL
    );

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_heartbeats_follow_interval() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(2));

    tokio::time::sleep(Duration::from_millis(6500)).await;

    let exchanges = dialer.exchanges();
    assert_eq!(exchanges.len(), 4); // t = 0, 2, 4, 6
    for pair in exchanges.windows(2) {
        assert_eq!(pair[1].started_at - pair[0].started_at, Duration::from_secs(2));
    }

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_immediate_check_resets_schedule() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(1)).await;
    monitor.request_immediate_check();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // t = 0 (initial), 1 (requested), 3 (scheduled from the requested one)
    let exchanges = dialer.exchanges();
    assert_eq!(exchanges.len(), 3);
    assert_eq!(
        exchanges[1].started_at - exchanges[0].started_at,
        Duration::from_secs(1)
    );
    assert_eq!(
        exchanges[2].started_at - exchanges[1].started_at,
        Duration::from_secs(2)
    );

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_request_right_after_heartbeat_waits_for_spacing() {
    let dialer = MockDialer::new();
    let monitor = start_monitor(&dialer, Duration::from_secs(60));

    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.request_immediate_check();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let exchanges = dialer.exchanges();
    assert_eq!(exchanges.len(), 2);
    assert_eq!(
        exchanges[1].started_at - exchanges[0].started_at,
        MIN_HEARTBEAT_INTERVAL
    );

    monitor.shutdown().await;
}
