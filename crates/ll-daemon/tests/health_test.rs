use std::sync::Arc;
use std::time::Duration;

use ll_core::types::ConnectionState;
use ll_daemon::health::{ConnectionHealth, ConnectionHealthMonitor};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(10);

fn monitor() -> (Arc<ConnectionHealth>, ConnectionHealthMonitor) {
    let health = Arc::new(ConnectionHealth::new(TIMEOUT));
    let monitor = ConnectionHealthMonitor::new(health.clone(), Duration::from_secs(1));
    (health, monitor)
}

#[tokio::test(start_paused = true)]
async fn one_tick_past_timeout_goes_stale_once() {
    let (health, monitor) = monitor();
    health.record_event().await;
    assert_eq!(monitor.check_once().await, None);

    tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(monitor.check_once().await, Some(ConnectionState::Stale));
    assert_eq!(health.state().await, ConnectionState::Stale);

    // No new event: same state, no second transition.
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(monitor.check_once().await, None);
    assert_eq!(health.state().await, ConnectionState::Stale);
}

#[tokio::test(start_paused = true)]
async fn event_after_disconnect_reconnects_without_waiting_for_a_tick() {
    let (health, monitor) = monitor();
    health.record_event().await;

    tokio::time::advance(TIMEOUT * 3 + Duration::from_secs(1)).await;
    assert_eq!(monitor.check_once().await, Some(ConnectionState::Disconnected));

    health.record_event().await;
    assert_eq!(health.state().await, ConnectionState::Connected);
    assert_eq!(monitor.check_once().await, None);
}

#[tokio::test(start_paused = true)]
async fn long_silence_jumps_straight_to_disconnected() {
    let (health, monitor) = monitor();
    health.record_event().await;
    tokio::time::advance(Duration::from_secs(120)).await;
    assert_eq!(monitor.check_once().await, Some(ConnectionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn monitor_loop_samples_until_cancelled() {
    let (health, monitor) = monitor();
    health.record_event().await;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(cancel.clone()));

    // Stale after 11s, disconnected after 31s.
    tokio::time::sleep(Duration::from_millis(35_500)).await;
    assert_eq!(health.state().await, ConnectionState::Disconnected);

    cancel.cancel();
    let transitions = handle.await.unwrap().unwrap();
    assert_eq!(transitions, 2);
}

#[tokio::test(start_paused = true)]
async fn monitor_without_events_stays_initializing() {
    let (health, monitor) = monitor();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(health.state().await, ConnectionState::Initializing);

    cancel.cancel();
    assert_eq!(handle.await.unwrap().unwrap(), 0);
}
