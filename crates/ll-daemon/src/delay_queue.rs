use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ll_core::driver::LeaderChange;
use ll_integrations::hue::{LampActuator, LightId, LightState};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A leader change waiting for its broadcast delay to elapse.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub due_at: Instant,
    /// Insertion order; higher means scheduled later.
    pub seq: u64,
    pub payload: LeaderChange,
}

/// Result of one drain pass that found due entries.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub payload: LeaderChange,
    /// Due entries discarded in favour of `payload`.
    pub superseded: usize,
    pub succeeded: bool,
}

/// Counters exposed for the shutdown summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub scheduled: u64,
    pub lamp_updates: u64,
    pub dispatch_failures: u64,
    pub superseded: u64,
}

/// Holds leader changes until `now >= due_at`, then applies only the most
/// recently scheduled due one to the lamps.
pub struct DelayedActionQueue {
    delay: Duration,
    actuator: Arc<dyn LampActuator>,
    lights: Vec<LightId>,
    pending: Mutex<Vec<ScheduledAction>>,
    next_seq: AtomicU64,
    lamp_updates: AtomicU64,
    dispatch_failures: AtomicU64,
    superseded: AtomicU64,
}

impl DelayedActionQueue {
    pub fn new(delay: Duration, actuator: Arc<dyn LampActuator>, lights: Vec<LightId>) -> Self {
        Self {
            delay,
            actuator,
            lights,
            pending: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            lamp_updates: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn schedule(&self, payload: LeaderChange) -> Instant {
        self.schedule_at(payload, Instant::now()).await
    }

    /// Queue `payload` for `now + delay`. No deduplication happens here.
    pub async fn schedule_at(&self, payload: LeaderChange, now: Instant) -> Instant {
        let due_at = now + self.delay;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            driver = %payload.driver.full_name,
            number = payload.identity(),
            delay_secs = self.delay.as_secs_f64(),
            "scheduled light update"
        );
        self.pending.lock().await.push(ScheduledAction {
            due_at,
            seq,
            payload,
        });
        due_at
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn pending(&self) -> Vec<ScheduledAction> {
        self.pending.lock().await.clone()
    }

    pub async fn drain(&self) -> Option<Dispatch> {
        self.drain_at(Instant::now()).await
    }

    /// Remove every entry due at `now` and dispatch the one scheduled last.
    ///
    /// Not-due entries are kept untouched. The lock is released before the
    /// actuator call. A failed dispatch is logged and dropped.
    pub async fn drain_at(&self, now: Instant) -> Option<Dispatch> {
        let due = {
            let mut pending = self.pending.lock().await;
            let (due, keep): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|action| action.due_at <= now);
            *pending = keep;
            due
        };

        let superseded = due.len().saturating_sub(1);
        let latest = due.into_iter().max_by_key(|action| action.seq)?;
        if superseded > 0 {
            self.superseded
                .fetch_add(superseded as u64, Ordering::Relaxed);
            debug!(superseded, "coalesced due light updates");
        }

        let payload = latest.payload;
        let state = LightState::for_driver(&payload.driver);
        let succeeded = match self.actuator.apply_state(&state, &self.lights).await {
            Ok(()) => {
                self.lamp_updates.fetch_add(1, Ordering::Relaxed);
                info!(
                    driver = %payload.driver.full_name,
                    number = payload.identity(),
                    team = %payload.driver.team_name,
                    lights = self.lights.len(),
                    "updated lights for new leader"
                );
                true
            }
            Err(e) => {
                self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    driver = %payload.driver.full_name,
                    number = payload.identity(),
                    error = %e,
                    "failed to update lights"
                );
                false
            }
        };

        Some(Dispatch {
            payload,
            superseded,
            succeeded,
        })
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            scheduled: self.next_seq.load(Ordering::Relaxed),
            lamp_updates: self.lamp_updates.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }

    /// Drain every `every` until cancelled.
    ///
    /// Cancellation is observed between passes, so an in-flight actuator
    /// call finishes before the loop returns.
    pub async fn run(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> Result<QueueStats, Infallible> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let pending = self.pending_len().await;
                    if pending > 0 {
                        debug!(pending, "light updater stopping with updates still pending");
                    }
                    return Ok(self.stats());
                }
                _ = tokio::time::sleep(every) => {
                    self.drain().await;
                }
            }
        }
    }
}
