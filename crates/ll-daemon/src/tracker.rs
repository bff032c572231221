use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ll_core::driver::{DriverRoster, LeaderChange};
use ll_core::event::{Event, Topic};
use ll_core::timing::TimingAppContent;
use ll_integrations::feed::EventHandler;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::delay_queue::DelayedActionQueue;
use crate::health::ConnectionHealth;

/// Default spacing of progress lines once past the first hundred events.
pub const DEFAULT_PROGRESS_EVERY: u64 = 1000;

#[derive(Debug, Default)]
struct Leaders {
    current: Option<LeaderChange>,
    history: Vec<LeaderChange>,
}

/// Follows `TimingAppData` snapshots, detects leader changes and schedules
/// a lamp update for each one.
pub struct LeaderTracker {
    topic: Topic,
    roster: Arc<DriverRoster>,
    health: Arc<ConnectionHealth>,
    queue: Arc<DelayedActionQueue>,
    leaders: Mutex<Leaders>,
    processed: AtomicU64,
    progress_every: u64,
}

impl LeaderTracker {
    pub fn new(
        roster: Arc<DriverRoster>,
        health: Arc<ConnectionHealth>,
        queue: Arc<DelayedActionQueue>,
    ) -> Self {
        Self {
            topic: Topic::TimingAppData,
            roster,
            health,
            queue,
            leaders: Mutex::new(Leaders::default()),
            processed: AtomicU64::new(0),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn events_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub async fn history(&self) -> Vec<LeaderChange> {
        self.leaders.lock().await.history.clone()
    }

    pub async fn leader_changes(&self) -> usize {
        self.leaders.lock().await.history.len()
    }

    pub async fn current_leader(&self) -> Option<LeaderChange> {
        self.leaders.lock().await.current.clone()
    }

    pub async fn process_event(&self, event: &Event) -> Option<LeaderChange> {
        self.process_event_at(event, Instant::now()).await
    }

    /// Handle one event observed at `now`.
    ///
    /// Returns the new leader when this event changed it. Events of other
    /// topics, malformed snapshots, snapshots without a car on line 1 and
    /// car numbers missing from the roster are ignored.
    pub async fn process_event_at(&self, event: &Event, now: Instant) -> Option<LeaderChange> {
        self.health.record_event_at(now).await;

        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if should_report_progress(count, self.progress_every) {
            debug!(messages = count, "processed messages so far");
        }

        if event.topic != self.topic {
            return None;
        }
        let content = TimingAppContent::from_payload(&event.payload)?;
        let car_number = content.leader_car_number()?;
        let driver = self.roster.resolve(car_number)?;
        let change = LeaderChange::new(driver.clone());

        {
            let mut leaders = self.leaders.lock().await;
            if leaders.current.as_ref() == Some(&change) {
                return None;
            }
            leaders.current = Some(change.clone());
            leaders.history.push(change.clone());
        }

        debug!(
            driver = %change.driver.full_name,
            number = change.identity(),
            at = %event.timestamp,
            "new leader"
        );
        self.queue.schedule_at(change.clone(), now).await;
        Some(change)
    }
}

#[async_trait]
impl EventHandler for LeaderTracker {
    async fn handle_event(&self, event: Event) {
        self.process_event(&event).await;
    }
}

/// Dense early (1, 10, 100), then every `every` events.
fn should_report_progress(count: u64, every: u64) -> bool {
    matches!(count, 1 | 10 | 100) || count % every == 0
}
