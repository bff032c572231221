use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ll_core::config::Config;
use ll_core::driver::DriverRoster;
use ll_core::types::ConnectionState;
use ll_harness::{TaskOutcome, TaskSupervisor};
use ll_integrations::feed::{EventHandler, EventSource, FeedClient, FeedStats};
use ll_integrations::hue::{LampActuator, LightId};
use tokio::sync::watch;
use tracing::{error, info};

use crate::delay_queue::DelayedActionQueue;
use crate::health::{ConnectionHealth, ConnectionHealthMonitor};
use crate::tracker::LeaderTracker;

/// Loop cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonIntervals {
    /// Pause between two drain passes of the delay queue (default: 100ms).
    pub drain: Duration,
    /// Pause between two health samples (default: 1s).
    pub health: Duration,
}

impl Default for DaemonIntervals {
    fn default() -> Self {
        Self {
            drain: Duration::from_millis(100),
            health: Duration::from_secs(1),
        }
    }
}

/// How long each supervised loop gets to stop after cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupTimeouts {
    pub drain: Duration,
    pub health: Duration,
    pub feed: Duration,
}

impl Default for CleanupTimeouts {
    fn default() -> Self {
        Self {
            drain: Duration::from_secs(1),
            health: Duration::from_secs(1),
            feed: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Final counters reported after shutdown.
#[derive(Debug, Clone)]
pub struct DaemonSummary {
    pub events_processed: u64,
    pub leader_changes: usize,
    pub lamp_updates: u64,
    pub dispatch_failures: u64,
    pub final_state: ConnectionState,
    pub feed: TaskOutcome<FeedStats>,
}

impl DaemonSummary {
    /// 0 on clean shutdown, 1 when the feed loop died with an error.
    pub fn exit_code(&self) -> u8 {
        if self.feed.is_failed() {
            1
        } else {
            0
        }
    }
}

/// Process-level orchestrator.
///
/// Starts the health monitor, the light updater and the feed client, each
/// under its own [`TaskSupervisor`], waits for the shutdown future, then
/// stops them in reverse order.
pub struct Daemon {
    roster: Arc<DriverRoster>,
    actuator: Arc<dyn LampActuator>,
    lights: Vec<LightId>,
    broadcast_delay: Duration,
    feed_timeout: Duration,
    stale_threshold: Duration,
    intervals: DaemonIntervals,
    cleanup: CleanupTimeouts,
    phase: watch::Sender<DaemonPhase>,
}

impl Daemon {
    pub fn new(
        config: &Config,
        roster: DriverRoster,
        actuator: Arc<dyn LampActuator>,
        lights: Vec<LightId>,
    ) -> Self {
        let (phase, _) = watch::channel(DaemonPhase::Starting);
        Self {
            roster: Arc::new(roster),
            actuator,
            lights,
            broadcast_delay: config.broadcast_delay,
            feed_timeout: config.feed_timeout,
            stale_threshold: config.stale_threshold,
            intervals: DaemonIntervals::default(),
            cleanup: CleanupTimeouts::default(),
            phase,
        }
    }

    pub fn with_intervals(mut self, intervals: DaemonIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_cleanup_timeouts(mut self, cleanup: CleanupTimeouts) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn phase(&self) -> DaemonPhase {
        *self.phase.borrow()
    }

    fn enter_phase(&self, phase: DaemonPhase) {
        self.phase.send_replace(phase);
        info!(phase = ?phase, "daemon phase");
    }

    /// Run until `shutdown` resolves, then tear everything down.
    pub async fn run<S, F>(&self, source: S, shutdown: F) -> DaemonSummary
    where
        S: EventSource + 'static,
        F: Future<Output = ()>,
    {
        self.enter_phase(DaemonPhase::Starting);

        let health = Arc::new(ConnectionHealth::new(self.stale_threshold));
        let queue = Arc::new(DelayedActionQueue::new(
            self.broadcast_delay,
            self.actuator.clone(),
            self.lights.clone(),
        ));
        let tracker = Arc::new(LeaderTracker::new(
            self.roster.clone(),
            health.clone(),
            queue.clone(),
        ));

        let monitor = ConnectionHealthMonitor::new(health.clone(), self.intervals.health);
        let mut health_task = TaskSupervisor::new("ConnectionMonitor", self.cleanup.health)
            .enter(|cancel| monitor.run(cancel));

        let drain_every = self.intervals.drain;
        let drain_queue = queue.clone();
        let mut drain_task = TaskSupervisor::new("LightUpdater", self.cleanup.drain)
            .enter(move |cancel| drain_queue.run(drain_every, cancel));

        let handler: Arc<dyn EventHandler> = tracker.clone();
        let feed = FeedClient::new(source, handler, self.feed_timeout);
        let feed_task = TaskSupervisor::new("LiveTimingClient", self.cleanup.feed).enter(
            |cancel| async move {
                let result = feed.run(cancel).await;
                if let Err(e) = &result {
                    error!(error = %e, "feed client stopped, waiting for shutdown");
                }
                result
            },
        );

        info!(
            lights = self.lights.len(),
            drivers = self.roster.len(),
            delay_secs = self.broadcast_delay.as_secs_f64(),
            "leadlamp running"
        );
        self.enter_phase(DaemonPhase::Running);

        shutdown.await;

        self.enter_phase(DaemonPhase::ShuttingDown);
        let feed_outcome = feed_task.into_outcome().await;
        drain_task.exit().await;
        health_task.exit().await;

        let queue_stats = queue.stats();
        let summary = DaemonSummary {
            events_processed: tracker.events_processed(),
            leader_changes: tracker.leader_changes().await,
            lamp_updates: queue_stats.lamp_updates,
            dispatch_failures: queue_stats.dispatch_failures,
            final_state: health.state().await,
            feed: feed_outcome,
        };

        info!(
            events_processed = summary.events_processed,
            leader_changes = summary.leader_changes,
            lamp_updates = summary.lamp_updates,
            dispatch_failures = summary.dispatch_failures,
            final_state = %summary.final_state,
            feed = summary.feed.label(),
            "leadlamp stopped"
        );
        self.enter_phase(DaemonPhase::Stopped);
        summary
    }
}
