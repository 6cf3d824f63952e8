//! Client configuration from environment variables
//!
//! Every value has a default, so an empty environment yields a working
//! local-development setup. Set values must parse; a typo is an error rather
//! than a silent fallback.
//!
//! # Environment Variables
//!
//! - `RACKETEER_SERVER_URL` - HTTP origin of the game server (default: http://localhost:3000)
//! - `RACKETEER_CHANNELS` - Channels to join, comma separated (default: global)
//! - `RACKETEER_HEARTBEAT_INTERVAL_MS` - Ping period (default: 30000)
//! - `RACKETEER_HEARTBEAT_TIMEOUT_MS` - Pong deadline (default: 10000)
//! - `RACKETEER_RECONNECT_BASE_MS` - First reconnect delay (default: 1000)
//! - `RACKETEER_RECONNECT_MULTIPLIER` - Backoff growth factor (default: 2.0)
//! - `RACKETEER_RECONNECT_MAX_DELAY_MS` - Backoff cap (default: 30000)
//! - `RACKETEER_RECONNECT_MAX_ATTEMPTS` - Retries before giving up (default: 10)
//! - `RACKETEER_QUEUE_MAX_ATTEMPTS` - Submissions per action (default: 3)
//! - `RACKETEER_QUEUE_RETENTION_SECS` - Age past which queued actions are dropped (default: 86400)
//! - `RACKETEER_QUEUE_GRACE_MS` - Visibility of finished actions (default: 5000)
//! - `RACKETEER_REQUEST_TIMEOUT_MS` - Per-submission HTTP timeout (default: 15000)
//!
//! The bearer token (`RACKETEER_TOKEN`) is read on demand by
//! `EnvCredentialProvider`, not here.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::application::services::action_queue::{
    DEFAULT_GRACE_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETENTION_SECS,
};
use crate::application::services::QueueConfig;
use crate::infrastructure::http_client::DEFAULT_REQUEST_TIMEOUT;
use crate::infrastructure::websocket::{BackoffPolicy, ConnectionConfig};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_CHANNEL: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the composition root needs to build a session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: Url,
    pub channels: Vec<String>,
    pub connection: ConnectionConfig,
    pub queue: QueueConfig,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_url = match get("RACKETEER_SERVER_URL") {
            Some(raw) => Url::parse(raw.trim()).map_err(|_| ConfigError::Invalid {
                key: "RACKETEER_SERVER_URL",
                value: raw,
            })?,
            None => Url::parse(DEFAULT_SERVER_URL).map_err(|_| ConfigError::Invalid {
                key: "RACKETEER_SERVER_URL",
                value: DEFAULT_SERVER_URL.to_string(),
            })?,
        };

        let channels = get("RACKETEER_CHANNELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| vec![DEFAULT_CHANNEL.to_string()]);

        let defaults = ConnectionConfig::new(server_url.clone());
        let backoff = BackoffPolicy {
            initial_delay: millis_or(
                &get,
                "RACKETEER_RECONNECT_BASE_MS",
                defaults.backoff.initial_delay,
            )?,
            multiplier: parse_or(
                &get,
                "RACKETEER_RECONNECT_MULTIPLIER",
                defaults.backoff.multiplier,
            )?,
            max_delay: millis_or(
                &get,
                "RACKETEER_RECONNECT_MAX_DELAY_MS",
                defaults.backoff.max_delay,
            )?,
            max_attempts: parse_or(
                &get,
                "RACKETEER_RECONNECT_MAX_ATTEMPTS",
                defaults.backoff.max_attempts,
            )?,
        };
        if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                key: "RACKETEER_RECONNECT_MULTIPLIER",
                value: backoff.multiplier.to_string(),
            });
        }

        let connection = ConnectionConfig {
            heartbeat_interval: millis_or(
                &get,
                "RACKETEER_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            )?,
            heartbeat_timeout: millis_or(
                &get,
                "RACKETEER_HEARTBEAT_TIMEOUT_MS",
                defaults.heartbeat_timeout,
            )?,
            backoff,
            ..defaults
        };
        for (key, value) in [
            ("RACKETEER_HEARTBEAT_INTERVAL_MS", connection.heartbeat_interval),
            ("RACKETEER_HEARTBEAT_TIMEOUT_MS", connection.heartbeat_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".to_string(),
                });
            }
        }

        let retention_secs: i64 =
            parse_or(&get, "RACKETEER_QUEUE_RETENTION_SECS", DEFAULT_RETENTION_SECS)?;
        let retention = chrono::Duration::try_seconds(retention_secs)
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or(ConfigError::Invalid {
                key: "RACKETEER_QUEUE_RETENTION_SECS",
                value: retention_secs.to_string(),
            })?;

        let queue = QueueConfig {
            max_attempts: parse_or(&get, "RACKETEER_QUEUE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retention,
            grace: millis_or(
                &get,
                "RACKETEER_QUEUE_GRACE_MS",
                Duration::from_millis(DEFAULT_GRACE_MS),
            )?,
        };
        if queue.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "RACKETEER_QUEUE_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_url,
            channels,
            connection,
            queue,
            request_timeout: millis_or(
                &get,
                "RACKETEER_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT,
            )?,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(get, key, default_ms).map(Duration::from_millis)
}
