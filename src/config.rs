//! Telemetry configuration loaded from `PIZZA_*` environment variables.
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PIZZA_SOURCE` | `jwt-pizza-service` | Component label and `source` attribute |
//! | `PIZZA_LOGGING_URL` | unset | Log push endpoint |
//! | `PIZZA_LOGGING_USER_ID` | unset | Log backend account id |
//! | `PIZZA_LOGGING_API_KEY` | unset | Log backend API key |
//! | `PIZZA_METRICS_URL` | unset | Metrics push endpoint |
//! | `PIZZA_METRICS_USER_ID` | unset | Metrics backend account id |
//! | `PIZZA_METRICS_API_KEY` | unset | Metrics backend API key |
//! | `PIZZA_METRICS_PERIOD_MS` | 60000 | Flush period (floor 1000) |
//! | `PIZZA_TELEMETRY_OFFLINE` | false | Suppress every outbound push |
//! | `PIZZA_LOG_LEVEL` | `info` | Local diagnostics filter |
//! | `PIZZA_LOG_FORMAT` | `json` | Local diagnostics format (`json` / `pretty`) |
//! | `PIZZA_BIND_ADDR` | `0.0.0.0:3000` | Host server address |
//!
//! Invalid values fall back to defaults without failing startup.

use std::str::FromStr;
use std::time::Duration;

use crate::error::TelemetryError;

pub const DEFAULT_SOURCE: &str = "jwt-pizza-service";
pub const DEFAULT_FLUSH_PERIOD_MS: u64 = 60_000;
pub const MIN_FLUSH_PERIOD_MS: u64 = 1_000;

/// Endpoint plus the id/key pair that forms the bearer credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub user_id: String,
    pub api_key: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, user_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            api_key: api_key.into(),
        }
    }

    /// A backend is usable only when all three parts are present.
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.user_id.is_empty() && !self.api_key.is_empty()
    }

    /// `Bearer <id>:<key>`
    pub fn bearer(&self) -> String {
        format!("Bearer {}:{}", self.user_id, self.api_key)
    }
}

/// Local diagnostics output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(TelemetryError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub source: String,
    pub logging: BackendConfig,
    pub metrics: BackendConfig,
    pub flush_period: Duration,
    /// When set, the host wires no-op exporters instead of HTTP ones.
    pub offline: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub bind_addr: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            logging: BackendConfig::default(),
            metrics: BackendConfig::default(),
            flush_period: Duration::from_millis(DEFAULT_FLUSH_PERIOD_MS),
            offline: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup; `from_env` is the real one.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let period_ms = match text("PIZZA_METRICS_PERIOD_MS") {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid PIZZA_METRICS_PERIOD_MS, using default");
                DEFAULT_FLUSH_PERIOD_MS
            }),
            None => DEFAULT_FLUSH_PERIOD_MS,
        };

        let log_format = match text("PIZZA_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to json diagnostics");
                LogFormat::Json
            }),
            None => defaults.log_format,
        };

        Self {
            source: text("PIZZA_SOURCE").unwrap_or(defaults.source),
            logging: BackendConfig {
                url: text("PIZZA_LOGGING_URL").unwrap_or_default(),
                user_id: text("PIZZA_LOGGING_USER_ID").unwrap_or_default(),
                api_key: text("PIZZA_LOGGING_API_KEY").unwrap_or_default(),
            },
            metrics: BackendConfig {
                url: text("PIZZA_METRICS_URL").unwrap_or_default(),
                user_id: text("PIZZA_METRICS_USER_ID").unwrap_or_default(),
                api_key: text("PIZZA_METRICS_API_KEY").unwrap_or_default(),
            },
            flush_period: clamp_flush_period(period_ms),
            offline: text("PIZZA_TELEMETRY_OFFLINE").map(|v| parse_flag(&v)).unwrap_or(false),
            log_level: text("PIZZA_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            bind_addr: text("PIZZA_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }
}

/// Zero means "use the default"; anything else is floored at one second.
pub fn clamp_flush_period(period_ms: u64) -> Duration {
    let ms = if period_ms == 0 { DEFAULT_FLUSH_PERIOD_MS } else { period_ms };
    Duration::from_millis(ms.max(MIN_FLUSH_PERIOD_MS))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on" | "test")
}
