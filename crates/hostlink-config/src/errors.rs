use thiserror::Error;

use crate::defaults::{MAX_PORT, MIN_PORT};

/// Errors raised when a loaded configuration holds unusable values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The listen port is reserved or otherwise outside the accepted range.
    #[error("port {port} is outside the accepted range {MIN_PORT}-{MAX_PORT}")]
    PortOutOfRange {
        /// The rejected port.
        port: u16,
    },
    /// The listen host is empty.
    #[error("listen host must not be empty")]
    EmptyHost,
    /// A duration setting was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        field: &'static str,
    },
}
