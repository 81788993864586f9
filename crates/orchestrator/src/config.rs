//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::EngineConfig;
use task_queue::WorkerConfig;
use thiserror::Error;

/// A configuration value that could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `CHAOS_PROBABILITY`: injected step failure rate in [0, 1] (default: `0.0`)
/// - `WORKER_CONCURRENCY`: tasks handled at once (default: `10`)
/// - `MAX_RETRIES`: retries for retryable task failures (default: `5`)
/// - `RETRY_BASE_MS`: first retry delay, doubled per retry (default: `1000`)
/// - `SHUTDOWN_GRACE_SECS`: drain time for in-flight tasks (default: `10`)
/// - `STALL_TIMEOUT_SECS`: default age for stall recovery (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub chaos_probability: f64,
    pub worker_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub shutdown_grace_secs: u64,
    pub stall_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&lookup, "LOG_FORMAT", defaults.log_format)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            chaos_probability: parse(&lookup, "CHAOS_PROBABILITY", defaults.chaos_probability)?,
            worker_concurrency: parse(&lookup, "WORKER_CONCURRENCY", defaults.worker_concurrency)?,
            max_retries: parse(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            retry_base_ms: parse(&lookup, "RETRY_BASE_MS", defaults.retry_base_ms)?,
            shutdown_grace_secs: parse(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace_secs,
            )?,
            stall_timeout_secs: parse(&lookup, "STALL_TIMEOUT_SECS", defaults.stall_timeout_secs)?,
        };

        if !(0.0..=1.0).contains(&config.chaos_probability) {
            return Err(ConfigError::Invalid {
                var: "CHAOS_PROBABILITY",
                value: config.chaos_probability.to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if config.worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chaos_probability: self.chaos_probability,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            max_retries: self.max_retries,
            retry_base: Duration::from_millis(self.retry_base_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            chaos_probability: 0.0,
            worker_concurrency: 10,
            max_retries: 5,
            retry_base_ms: 1000,
            shutdown_grace_secs: 10,
            stall_timeout_secs: 300,
        }
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
