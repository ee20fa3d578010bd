//! Link configuration.
//!
//! The controller endpoint is fixed at startup. Values come from defaults,
//! then the environment (`ROVER_HOST`, `ROVER_PORT`, `ROVER_RECONNECT_MS`,
//! `ROVER_REQUEST_TIMEOUT_MS`), then command-line flags in the binary.

use std::time::Duration;

use thiserror::Error;

/// Default controller address on the lab network.
pub const DEFAULT_HOST: &str = "192.168.0.134";

/// Default controller port.
pub const DEFAULT_PORT: u16 = 5555;

/// Fixed delay between a connection loss and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bounded request channel size between handles and the link task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const ENV_HOST: &str = "ROVER_HOST";
pub const ENV_PORT: &str = "ROVER_PORT";
pub const ENV_RECONNECT_MS: &str = "ROVER_RECONNECT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "ROVER_REQUEST_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings for one controller link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Delay before reconnecting. There is no backoff and no retry limit.
    pub reconnect_delay: Duration,
    /// Per-request deadline. `None` waits until a response or connection loss.
    pub request_timeout: Option<Duration>,
    pub channel_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl LinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            let host = host.trim();
            if !host.is_empty() {
                config.host = host.to_string();
            }
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = parse_number(ENV_PORT, &port)?;
        }
        if let Some(ms) = lookup(ENV_RECONNECT_MS) {
            config.reconnect_delay = Duration::from_millis(parse_number(ENV_RECONNECT_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = timeout_from_millis(parse_number(ENV_REQUEST_TIMEOUT_MS, &ms)?);
        }

        Ok(config)
    }

    /// `host:port` for logging.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Zero disables the request timeout.
pub fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
