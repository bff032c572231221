mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{arc_actuator, leader_event, lights, roster, RecordingActuator};
use ll_core::color::XyColor;
use ll_core::config::Config;
use ll_core::types::ConnectionState;
use ll_daemon::daemon::{Daemon, DaemonPhase};
use ll_harness::{ShutdownSignal, TaskOutcome};
use ll_integrations::feed::{ChannelSource, FeedEnd};

fn config(pairs: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = [
        ("HUE_BRIDGE_IP", "127.0.0.1"),
        ("HUE_USERNAME", "test-user"),
        ("TV_DELAY_SECONDS", "5"),
        ("CONNECTION_TIMEOUT_SECONDS", "10"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in pairs {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|k| env.get(k).cloned()).unwrap()
}

fn daemon(config: &Config, actuator: &Arc<RecordingActuator>) -> Daemon {
    let roster = Arc::try_unwrap(roster()).unwrap();
    Daemon::new(config, roster, arc_actuator(actuator), lights())
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn leader_changes_reach_the_lamps_after_the_delay() {
    let actuator = Arc::new(RecordingActuator::default());
    let daemon = daemon(&config(&[]), &actuator);
    assert_eq!(daemon.phase(), DaemonPhase::Starting);

    let (tx, source) = ChannelSource::channel(16);
    let shutdown = ShutdownSignal::new();

    let script = async {
        tx.send(leader_event(44, 1)).await.unwrap();
        tokio::time::sleep(secs(1)).await;
        tx.send(leader_event(1, 44)).await.unwrap();
        tokio::time::sleep(secs(1)).await;
        assert_eq!(daemon.phase(), DaemonPhase::Running);
        assert_eq!(actuator.count().await, 0);

        // Last event at 1s: the health tick at 12s sees 11s of silence.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        shutdown.trigger();
    };

    let (summary, ()) = tokio::join!(daemon.run(source, shutdown.wait()), script);

    assert_eq!(daemon.phase(), DaemonPhase::Stopped);
    assert_eq!(summary.events_processed, 2);
    assert_eq!(summary.leader_changes, 2);
    assert_eq!(summary.lamp_updates, 2);
    assert_eq!(summary.dispatch_failures, 0);
    assert_eq!(summary.final_state, ConnectionState::Stale);
    assert_eq!(summary.exit_code(), 0);
    match summary.feed {
        TaskOutcome::Completed(stats) => {
            assert_eq!(stats.events_received, 2);
            assert_eq!(stats.end, FeedEnd::Cancelled);
        }
        other => panic!("unexpected feed outcome {other:?}"),
    }

    let hamilton = XyColor::from_hex("27F4D2");
    let verstappen = XyColor::from_hex("3671C6");
    assert_eq!(
        actuator.colours().await,
        vec![(hamilton.x, hamilton.y), (verstappen.x, verstappen.y)]
    );
}

#[tokio::test(start_paused = true)]
async fn brief_overtake_is_coalesced_into_one_update() {
    let actuator = Arc::new(RecordingActuator::default());
    let daemon = daemon(&config(&[]), &actuator);
    let (tx, source) = ChannelSource::channel(16);
    let shutdown = ShutdownSignal::new();

    let script = async {
        // All three land inside a single drain interval once due.
        tx.send(leader_event(16, 1)).await.unwrap();
        tx.send(leader_event(1, 16)).await.unwrap();
        tx.send(leader_event(16, 1)).await.unwrap();
        tokio::time::sleep(secs(7)).await;
        shutdown.trigger();
    };

    let (summary, ()) = tokio::join!(daemon.run(source, shutdown.wait()), script);

    assert_eq!(summary.leader_changes, 3);
    assert_eq!(summary.lamp_updates, 1);
    let leclerc = XyColor::from_hex("E8002D");
    assert_eq!(actuator.colours().await, vec![(leclerc.x, leclerc.y)]);
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_keeps_running_until_shutdown() {
    let actuator = Arc::new(RecordingActuator::default());
    let daemon = daemon(&config(&[]), &actuator);
    let (tx, source) = ChannelSource::channel(4);
    let shutdown = ShutdownSignal::new();

    let script = async {
        tx.send(leader_event(44, 16)).await.unwrap();
        drop(tx);
        tokio::time::sleep(secs(6)).await;
        assert_eq!(daemon.phase(), DaemonPhase::Running);
        shutdown.trigger();
    };

    let (summary, ()) = tokio::join!(daemon.run(source, shutdown.wait()), script);

    assert_eq!(summary.lamp_updates, 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(matches!(
        summary.feed,
        TaskOutcome::Completed(stats) if stats.end == FeedEnd::EndOfStream
    ));
}

#[tokio::test(start_paused = true)]
async fn feed_timeout_before_shutdown_exits_non_zero() {
    let actuator = Arc::new(RecordingActuator::default());
    let daemon = daemon(&config(&[("FEED_TIMEOUT_SECONDS", "30")]), &actuator);
    let (_tx, source) = ChannelSource::channel(4);

    let shutdown = async {
        tokio::time::sleep(secs(60)).await;
    };
    let summary = daemon.run(source, shutdown).await;

    assert!(summary.feed.is_failed());
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.events_processed, 0);
    assert_eq!(summary.final_state, ConnectionState::Initializing);
}

#[tokio::test(start_paused = true)]
async fn failing_bridge_is_counted_not_fatal() {
    let actuator = Arc::new(RecordingActuator::failing());
    let daemon = daemon(&config(&[("TV_DELAY_SECONDS", "1")]), &actuator);
    let (tx, source) = ChannelSource::channel(4);
    let shutdown = ShutdownSignal::new();

    let script = async {
        tx.send(leader_event(1, 44)).await.unwrap();
        tokio::time::sleep(secs(2)).await;
        tx.send(leader_event(44, 1)).await.unwrap();
        tokio::time::sleep(secs(2)).await;
        shutdown.trigger();
    };

    let (summary, ()) = tokio::join!(daemon.run(source, shutdown.wait()), script);

    assert_eq!(summary.dispatch_failures, 2);
    assert_eq!(summary.lamp_updates, 0);
    assert_eq!(summary.final_state, ConnectionState::Connected);
    assert_eq!(summary.exit_code(), 0);
}
