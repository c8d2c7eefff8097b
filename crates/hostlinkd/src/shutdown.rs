use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;
use tracing::info;

use crate::HOST_TARGET;

/// Abstraction over shutdown notification mechanisms.
///
/// The host loop polls between ticks, so implementations must not block.
pub trait ShutdownSignal: Send + Sync {
    /// Returns true once shutdown should proceed.
    fn requested(&self) -> bool;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener raised by termination signals.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl SystemShutdownSignal {
    /// Registers handlers for `SIGTERM`, `SIGINT`, `SIGQUIT`, and `SIGHUP`.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when a handler cannot be registered.
    pub fn install() -> Result<Self, ShutdownError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            flag::register(signal, Arc::clone(&shutdown))
                .map_err(|source| ShutdownError::Install { source })?;
        }
        Ok(Self { flag: shutdown })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn requested(&self) -> bool {
        let requested = self.flag.load(Ordering::SeqCst);
        if requested {
            info!(target: HOST_TARGET, "shutdown signal received");
        }
        requested
    }
}
