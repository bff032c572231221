use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Process configuration, read once at startup and handed to each component.
///
/// **Security**: `Debug` never prints the bridge credentials.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub bridge_ip: String,
    pub username: String,
    pub client_key: Option<String>,
    /// Broadcast delay between a leader change and the lamp update.
    pub broadcast_delay: Duration,
    /// Longest gap between two feed events before the read loop gives up.
    pub feed_timeout: Duration,
    /// Silence after which the feed is reported stale.
    pub stale_threshold: Duration,
    pub drivers_file: PathBuf,
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Environment keys and defaults
// ---------------------------------------------------------------------------

pub const ENV_BRIDGE_IP: &str = "HUE_BRIDGE_IP";
pub const ENV_USERNAME: &str = "HUE_USERNAME";
pub const ENV_CLIENT_KEY: &str = "HUE_CLIENT_KEY";
pub const ENV_BROADCAST_DELAY: &str = "TV_DELAY_SECONDS";
pub const ENV_FEED_TIMEOUT: &str = "FEED_TIMEOUT_SECONDS";
pub const ENV_STALE_THRESHOLD: &str = "CONNECTION_TIMEOUT_SECONDS";
pub const ENV_DRIVERS_FILE: &str = "DRIVERS_FILE";
pub const ENV_LOG_LEVEL: &str = "LEADLAMP_LOG_LEVEL";

pub const DEFAULT_BROADCAST_DELAY_SECS: f64 = 56.5;
pub const DEFAULT_FEED_TIMEOUT_SECS: f64 = 1800.0;
pub const DEFAULT_STALE_THRESHOLD_SECS: f64 = 10.0;
pub const DEFAULT_DRIVERS_FILE: &str = "drivers.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Upper bound for every configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

impl Config {
    /// Load `.env` (if present) and build the configuration from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env, using process environment"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bridge_ip = get(ENV_BRIDGE_IP).ok_or(ConfigError::Missing(ENV_BRIDGE_IP))?;
        let username = get(ENV_USERNAME).ok_or(ConfigError::Missing(ENV_USERNAME))?;

        let cfg = Config {
            bridge_ip,
            username,
            client_key: get(ENV_CLIENT_KEY),
            broadcast_delay: seconds(
                ENV_BROADCAST_DELAY,
                get(ENV_BROADCAST_DELAY),
                DEFAULT_BROADCAST_DELAY_SECS,
            )?,
            feed_timeout: seconds(
                ENV_FEED_TIMEOUT,
                get(ENV_FEED_TIMEOUT),
                DEFAULT_FEED_TIMEOUT_SECS,
            )?,
            stale_threshold: seconds(
                ENV_STALE_THRESHOLD,
                get(ENV_STALE_THRESHOLD),
                DEFAULT_STALE_THRESHOLD_SECS,
            )?,
            drivers_file: get(ENV_DRIVERS_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DRIVERS_FILE)),
            log_level: get(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic checks that parsing alone does not cover.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_timeout.is_zero() {
            return Err(ConfigError::Validation(format!(
                "{ENV_FEED_TIMEOUT} must be greater than zero"
            )));
        }
        if self.stale_threshold.is_zero() {
            return Err(ConfigError::Validation(format!(
                "{ENV_STALE_THRESHOLD} must be greater than zero"
            )));
        }
        for (key, value) in [
            (ENV_BROADCAST_DELAY, self.broadcast_delay),
            (ENV_FEED_TIMEOUT, self.feed_timeout),
            (ENV_STALE_THRESHOLD, self.stale_threshold),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::Validation(format!(
                    "{key} must be at most {} seconds, got {}",
                    MAX_DURATION.as_secs(),
                    value.as_secs_f64()
                )));
            }
        }
        if self.bridge_ip.contains('/') {
            return Err(ConfigError::Validation(format!(
                "{ENV_BRIDGE_IP} must be a host or address, not a URL: '{}'",
                self.bridge_ip
            )));
        }
        Ok(())
    }
}

fn seconds(key: &'static str, raw: Option<String>, default: f64) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs_f64(default));
    };
    let secs: f64 = raw.parse().map_err(|_| ConfigError::Parse {
        key,
        value: raw.clone(),
    })?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::Validation(format!(
            "{key} must be a non-negative number of seconds, got '{raw}'"
        ))
    })
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bridge_ip", &self.bridge_ip)
            .field("username", &"***")
            .field("client_key", &self.client_key.as_ref().map(|_| "***"))
            .field("broadcast_delay", &self.broadcast_delay)
            .field("feed_timeout", &self.feed_timeout)
            .field("stale_threshold", &self.stale_threshold)
            .field("drivers_file", &self.drivers_file)
            .field("log_level", &self.log_level)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("parse: {key}='{value}' is not a number")]
    Parse { key: &'static str, value: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_set() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_BRIDGE_IP, "192.168.1.20"),
            (ENV_USERNAME, "app-key"),
        ]))
        .unwrap();
        assert_eq!(cfg.broadcast_delay, Duration::from_millis(56_500));
        assert_eq!(cfg.feed_timeout, Duration::from_secs(1800));
        assert_eq!(cfg.stale_threshold, Duration::from_secs(10));
        assert_eq!(cfg.drivers_file, PathBuf::from("drivers.json"));
        assert!(cfg.client_key.is_none());
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let err = Config::from_lookup(lookup(&[(ENV_BRIDGE_IP, "  "), (ENV_USERNAME, "k")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_BRIDGE_IP)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_BRIDGE_IP, "10.0.0.2"),
            (ENV_USERNAME, "super-secret-user"),
            (ENV_CLIENT_KEY, "super-secret-key"),
        ]))
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("10.0.0.2"));
    }
}
