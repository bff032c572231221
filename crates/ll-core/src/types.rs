use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Liveness of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No event has been observed yet.
    #[default]
    Initializing,
    Connected,
    Stale,
    Disconnected,
}

impl ConnectionState {
    /// Number of stale thresholds after which the feed counts as lost.
    pub const DISCONNECT_FACTOR: u32 = 3;

    /// Classify the time since the last event against the stale threshold.
    ///
    /// `elapsed <= timeout` is connected, `elapsed <= 3 * timeout` is stale,
    /// anything longer is disconnected.
    pub fn for_elapsed(elapsed: Duration, timeout: Duration) -> Self {
        if elapsed > timeout.saturating_mul(Self::DISCONNECT_FACTOR) {
            ConnectionState::Disconnected
        } else if elapsed > timeout {
            ConnectionState::Stale
        } else {
            ConnectionState::Connected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Initializing => "initializing",
            ConnectionState::Connected => "connected",
            ConnectionState::Stale => "stale",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
