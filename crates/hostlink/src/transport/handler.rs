//! Connection handling abstraction for the bridge listener.

use std::net::TcpStream;

/// Handles accepted socket connections.
///
/// Each call runs on its own thread and owns the stream until it returns.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}
