//! Shared configuration for the hostlink bridge and its reference host.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then any
//! discovered configuration file, then `HOSTLINK_*` environment variables, and
//! finally command-line flags. The resolved [`Config`] is validated separately
//! via [`Config::validate`] so callers decide whether an out-of-range value is
//! fatal.

mod defaults;
mod errors;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_TASK_TIMEOUT_MS,
    DEFAULT_TICK_INTERVAL_MS, MAX_PORT, MIN_PORT, default_host, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use errors::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HOSTLINK")]
pub struct Config {
    /// Address the bridge listens on.
    #[ortho_config(default = default_host())]
    pub host: String,
    /// TCP port the bridge listens on.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// `tracing` filter directive.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound, in milliseconds, on waiting for the main thread.
    #[ortho_config(default = DEFAULT_TASK_TIMEOUT_MS)]
    pub task_timeout_ms: u64,
    /// Interval between host main-loop ticks in milliseconds.
    #[ortho_config(default = DEFAULT_TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Listen address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Listen port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Main-thread wait bound as a [`Duration`].
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Host main-loop tick as a [`Duration`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Human-readable `tcp://host:port` form of the listen address.
    #[must_use]
    pub fn listen_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Checks value ranges the loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the port falls outside
    /// [`MIN_PORT`]..=[`MAX_PORT`], the host is blank, or a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if !(MIN_PORT..=MAX_PORT).contains(&self.port) {
            return Err(ConfigError::PortOutOfRange { port: self.port });
        }
        if self.task_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "task_timeout_ms",
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "tick_interval_ms",
            });
        }
        Ok(())
    }
}
