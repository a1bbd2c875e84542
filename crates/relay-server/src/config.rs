//! Server configuration.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. Apply environment variable overrides (`PORT`, `HOST`, `RELAY_*`)
//! 3. The binary applies CLI flags last
//!
//! Invalid environment values are logged and ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `5000`, `0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per WebSocket before new ones are dropped.
    pub max_send_queue: usize,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// A client that has not answered a ping for this long is reaped.
    pub client_timeout_secs: u64,
    /// How often the dead-client sweep runs.
    pub cleanup_interval_secs: u64,
    /// Upper bound on waiting for a session task to stop.
    pub teardown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
            teardown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from any key/value source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = read("PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn_invalid("PORT", &v),
            }
        }
        if let Some(v) = read("HOST") {
            self.host = v;
        }
        if let Some(v) = read("RELAY_MAX_SEND_QUEUE") {
            match parse_usize_range(&v, 1, 65_536) {
                Some(n) => self.max_send_queue = n,
                None => warn_invalid("RELAY_MAX_SEND_QUEUE", &v),
            }
        }
        if let Some(v) = read("RELAY_HEARTBEAT_INTERVAL_SECS") {
            match parse_u64_range(&v, 1, 3_600) {
                Some(n) => self.heartbeat_interval_secs = n,
                None => warn_invalid("RELAY_HEARTBEAT_INTERVAL_SECS", &v),
            }
        }
        if let Some(v) = read("RELAY_TEARDOWN_TIMEOUT_MS") {
            match parse_u64_range(&v, 10, 600_000) {
                Some(n) => self.teardown_timeout_ms = n,
                None => warn_invalid("RELAY_TEARDOWN_TIMEOUT_MS", &v),
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}
