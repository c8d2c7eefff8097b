//! Lifecycle of the bridge server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::listener::{ListenerContext, ListenerHandle, SocketListener};
use super::{CommandConnectionHandler, ConnectionRegistry, LISTENER_TARGET, ListenerError};
use crate::envelope::ContextProvider;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::router::CommandRouter;
use crate::scheduler::MainThreadScheduler;

/// Upper bound on how long [`BridgeServer::stop`] waits for the accept loop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct Running {
    addr: SocketAddr,
    listener: ListenerHandle,
}

/// Accepts bridge clients and routes their commands onto the main thread.
///
/// ```no_run
/// use std::time::Duration;
///
/// use hostlink::{BridgeServer, CommandRouter, NoContext, main_thread_channel};
///
/// let (scheduler, queue) = main_thread_channel::<NoContext>(Duration::from_secs(30));
/// let mut server = BridgeServer::new(CommandRouter::new(), scheduler);
/// let addr = server.start("127.0.0.1", 9876)?;
/// println!("listening on {addr}");
/// let mut host = NoContext;
/// while server.is_running() {
///     queue.wait_and_drain(&mut host, Duration::from_millis(16));
/// }
/// # Ok::<(), hostlink::ListenerError>(())
/// ```
pub struct BridgeServer<H: ContextProvider + 'static> {
    router: Arc<CommandRouter<H>>,
    scheduler: MainThreadScheduler<H>,
    reporter: Arc<dyn HealthReporter>,
    registry: Arc<ConnectionRegistry>,
    running: Option<Running>,
}

impl<H: ContextProvider + 'static> BridgeServer<H> {
    /// A stopped server that routes through `router` and `scheduler`.
    #[must_use]
    pub fn new(router: CommandRouter<H>, scheduler: MainThreadScheduler<H>) -> Self {
        Self {
            router: Arc::new(router),
            scheduler,
            reporter: Arc::new(StructuredHealthReporter::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            running: None,
        }
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl HealthReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Binds `host:port` and starts accepting connections.
    ///
    /// Starting a running server logs a warning and returns the existing
    /// address. Port 0 binds an ephemeral port; the returned address reports
    /// the one chosen.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] when the address cannot be resolved or bound,
    /// or the accept thread cannot be spawned.
    pub fn start(&mut self, host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            warn!(
                target: LISTENER_TARGET,
                addr = %running.addr,
                "server is already running"
            );
            return Ok(running.addr);
        }

        self.reporter.server_starting(host, port);
        match self.spawn_listener(host, port) {
            Ok(running) => {
                let addr = running.addr;
                self.running = Some(running);
                self.reporter.server_listening(addr);
                Ok(addr)
            }
            Err(error) => {
                self.reporter.server_start_failed(&error);
                Err(error)
            }
        }
    }

    fn spawn_listener(&self, host: &str, port: u16) -> Result<Running, ListenerError> {
        let listener = SocketListener::bind(host, port)?;
        let addr = listener.local_addr();
        self.registry.reopen();
        let handler = CommandConnectionHandler::new(Arc::clone(&self.router), self.scheduler.clone());
        let listener = listener.start(ListenerContext {
            handler: Arc::new(handler),
            registry: Arc::clone(&self.registry),
            reporter: Arc::clone(&self.reporter),
        })?;
        Ok(Running { addr, listener })
    }

    /// Stops accepting, force-closes open connections, and waits at most
    /// [`STOP_TIMEOUT`] for the accept loop. A no-op when not running.
    ///
    /// Commands already queued for the main thread still run; their
    /// responses are discarded.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.listener.shutdown();
        let closed = self.registry.close_all();
        if let Err(error) = running.listener.join_timeout(STOP_TIMEOUT) {
            warn!(target: LISTENER_TARGET, %error, "listener did not stop cleanly");
        }
        info!(
            target: LISTENER_TARGET,
            addr = %running.addr,
            closed,
            "server stopped"
        );
        self.reporter.server_stopped(closed);
    }

    /// Returns true between a successful [`start`](Self::start) and
    /// [`stop`](Self::stop).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    /// Number of open client connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// The router commands are dispatched through.
    #[must_use]
    pub fn router(&self) -> &CommandRouter<H> {
        &self.router
    }
}

impl<H: ContextProvider + 'static> Drop for BridgeServer<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
