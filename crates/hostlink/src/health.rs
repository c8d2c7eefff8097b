//! Structured health reporting for bridge lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::transport::ListenerError;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the listener binds.
    fn server_starting(&self, host: &str, port: u16);

    /// Invoked once the listener accepts connections.
    fn server_listening(&self, addr: SocketAddr);

    /// Invoked when binding or spawning the listener fails.
    fn server_start_failed(&self, error: &ListenerError);

    /// Invoked after the server has shut down.
    fn server_stopped(&self, closed_connections: usize);

    /// Invoked when a client connects.
    fn connection_opened(&self, peer: Option<SocketAddr>);

    /// Invoked when a client's connection ends.
    fn connection_closed(&self, peer: Option<SocketAddr>);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn server_starting(&self, host: &str, port: u16) {
        (**self).server_starting(host, port);
    }

    fn server_listening(&self, addr: SocketAddr) {
        (**self).server_listening(addr);
    }

    fn server_start_failed(&self, error: &ListenerError) {
        (**self).server_start_failed(error);
    }

    fn server_stopped(&self, closed_connections: usize) {
        (**self).server_stopped(closed_connections);
    }

    fn connection_opened(&self, peer: Option<SocketAddr>) {
        (**self).connection_opened(peer);
    }

    fn connection_closed(&self, peer: Option<SocketAddr>) {
        (**self).connection_closed(peer);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn server_starting(&self, host: &str, port: u16) {
        tracing::info!(
            target: "hostlink::health",
            event = "server_starting",
            host,
            port,
            "starting bridge server"
        );
    }

    fn server_listening(&self, addr: SocketAddr) {
        tracing::info!(
            target: "hostlink::health",
            event = "server_listening",
            addr = %addr,
            "bridge server listening"
        );
    }

    fn server_start_failed(&self, error: &ListenerError) {
        tracing::error!(
            target: "hostlink::health",
            event = "server_start_failed",
            error = %error,
            "bridge server failed to start"
        );
    }

    fn server_stopped(&self, closed_connections: usize) {
        tracing::info!(
            target: "hostlink::health",
            event = "server_stopped",
            closed_connections,
            "bridge server stopped"
        );
    }

    fn connection_opened(&self, peer: Option<SocketAddr>) {
        tracing::info!(
            target: "hostlink::health",
            event = "connection_opened",
            peer = ?peer,
            "client connected"
        );
    }

    fn connection_closed(&self, peer: Option<SocketAddr>) {
        tracing::info!(
            target: "hostlink::health",
            event = "connection_closed",
            peer = ?peer,
            "client disconnected"
        );
    }
}
