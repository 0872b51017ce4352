//! Connection configuration parsed from code or environment variables.

use std::time::Duration;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

pub const ENDPOINT_ENV: &str = "CARELINK_WS_URL";
pub const MAX_RECONNECT_ATTEMPTS_ENV: &str = "CARELINK_MAX_RECONNECT_ATTEMPTS";
pub const RECONNECT_DELAY_MS_ENV: &str = "CARELINK_RECONNECT_DELAY_MS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing websocket endpoint; set {var}")]
    MissingEndpoint { var: &'static str },
    #[error("invalid websocket endpoint '{0}' (expected ws://, wss://, http:// or https://)")]
    InvalidEndpoint(String),
}

/// Constant-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive automatic attempts allowed after the last successful open.
    pub max_attempts: u32,
    /// Wait before each attempt. Not scaled between attempts.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    /// Config for `endpoint` with the default retry budget (5 attempts, 1s apart).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), reconnect: ReconnectPolicy::default() }
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, max_attempts: u32) -> Self {
        self.reconnect.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `CARELINK_WS_URL`: `ws(s)://` endpoint, or an `http(s)://` base that
    ///   is rewritten to the matching websocket scheme
    ///
    /// Optional:
    /// - `CARELINK_MAX_RECONNECT_ATTEMPTS`: default 5
    /// - `CARELINK_RECONNECT_DELAY_MS`: default 1000
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(ENDPOINT_ENV)
            .map_err(|_| ConfigError::MissingEndpoint { var: ENDPOINT_ENV })?;
        let endpoint = ws_url_from_base(&raw)?;

        Ok(Self::new(endpoint)
            .with_max_reconnect_attempts(env_parse(
                MAX_RECONNECT_ATTEMPTS_ENV,
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ))
            .with_reconnect_delay(Duration::from_millis(env_parse(
                RECONNECT_DELAY_MS_ENV,
                DEFAULT_RECONNECT_DELAY_MS,
            ))))
    }
}

/// Normalize an endpoint to a websocket URL.
///
/// `ws://` and `wss://` pass through; `http://` and `https://` map to `ws://`
/// and `wss://`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEndpoint`] for any other scheme or an empty host.
pub fn ws_url_from_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| ConfigError::InvalidEndpoint(raw.to_owned()))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        _ => return Err(ConfigError::InvalidEndpoint(raw.to_owned())),
    };
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::InvalidEndpoint(raw.to_owned()));
    }
    Ok(format!("{ws_scheme}://{rest}"))
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
