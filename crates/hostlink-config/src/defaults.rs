use crate::logging::LogFormat;

/// Default listen address; the protocol assumes a trusted loopback client.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the bridge.
pub const DEFAULT_PORT: u16 = 9876;

/// Lowest port accepted by [`crate::Config::validate`].
pub const MIN_PORT: u16 = 1024;

/// Highest port accepted by [`crate::Config::validate`].
pub const MAX_PORT: u16 = 65535;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound on waiting for the main thread, in milliseconds.
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;

/// Default main-loop tick for the reference host, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

/// Owned default listen address.
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
