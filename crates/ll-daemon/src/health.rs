use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use ll_core::types::ConnectionState;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug)]
struct HealthInner {
    last_event: Option<Instant>,
    state: ConnectionState,
}

/// Shared feed-liveness record.
///
/// The tracker stamps every event through [`record_event`]; the monitor
/// samples it through [`check_at`]. State stays `Initializing` until the
/// first event.
///
/// [`record_event`]: ConnectionHealth::record_event
/// [`check_at`]: ConnectionHealth::check_at
#[derive(Debug)]
pub struct ConnectionHealth {
    stale_threshold: Duration,
    inner: Mutex<HealthInner>,
}

impl ConnectionHealth {
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            stale_threshold,
            inner: Mutex::new(HealthInner {
                last_event: None,
                state: ConnectionState::Initializing,
            }),
        }
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn last_event(&self) -> Option<Instant> {
        self.inner.lock().await.last_event
    }

    pub async fn record_event(&self) -> bool {
        self.record_event_at(Instant::now()).await
    }

    /// Stamp an event arrival and flip to `Connected` right away.
    ///
    /// Returns `true` for the first event ever recorded.
    pub async fn record_event_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().await;
        let first = inner.last_event.is_none();
        inner.last_event = Some(now);

        match inner.state {
            ConnectionState::Connected => {}
            ConnectionState::Initializing => {
                info!("initial connection established, receiving data");
                inner.state = ConnectionState::Connected;
            }
            previous => {
                info!(previous = %previous, "connection re-established, receiving data");
                inner.state = ConnectionState::Connected;
            }
        }
        first
    }

    /// Re-evaluate the state at `now`.
    ///
    /// Returns the new state when it changed, `None` otherwise. Every
    /// transition is logged once; repeated samples in the same state are
    /// silent.
    pub async fn check_at(&self, now: Instant) -> Option<ConnectionState> {
        let mut inner = self.inner.lock().await;
        let last = inner.last_event?;
        let elapsed = now.saturating_duration_since(last);
        let next = ConnectionState::for_elapsed(elapsed, self.stale_threshold);
        if next == inner.state {
            return None;
        }

        let elapsed_secs = elapsed.as_secs_f64();
        match next {
            ConnectionState::Connected => info!("connection established, receiving data"),
            ConnectionState::Stale => {
                warn!(elapsed_secs, "connection stale, no events received recently")
            }
            ConnectionState::Disconnected => {
                error!(elapsed_secs, "connection lost, no events received")
            }
            ConnectionState::Initializing => {}
        }
        inner.state = next;
        Some(next)
    }
}

// ---------------------------------------------------------------------------
// Monitor loop
// ---------------------------------------------------------------------------

/// Periodic sampler over a [`ConnectionHealth`].
#[derive(Debug, Clone)]
pub struct ConnectionHealthMonitor {
    health: Arc<ConnectionHealth>,
    interval: Duration,
}

impl ConnectionHealthMonitor {
    pub fn new(health: Arc<ConnectionHealth>, interval: Duration) -> Self {
        Self { health, interval }
    }

    /// One sampling tick.
    pub async fn check_once(&self) -> Option<ConnectionState> {
        self.health.check_at(Instant::now()).await
    }

    /// Sample every `interval` until cancelled; returns the number of
    /// transitions observed.
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, Infallible> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick.
        ticker.tick().await;

        let mut transitions = 0_u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(transitions),
                _ = ticker.tick() => {
                    if self.check_once().await.is_some() {
                        transitions += 1;
                    }
                }
            }
        }
    }
}
