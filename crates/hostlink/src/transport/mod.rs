//! TCP transport for the bridge.
//!
//! The listener binds a TCP socket and accepts connections on a background
//! thread; each connection is served on its own thread by a
//! [`ConnectionHandler`]. [`BridgeServer`] ties the listener to the router
//! and scheduler and owns the start/stop lifecycle.

mod connection;
mod errors;
mod framing;
mod handler;
mod listener;
mod registry;
mod server;
#[cfg(test)]
mod test_utils;

pub use self::connection::{CommandConnectionHandler, ConnectionEnd, READ_CHUNK_BYTES};
pub use self::errors::ListenerError;
pub use self::framing::{Frame, MAX_MESSAGE_BYTES, MessageBuffer};
pub use self::handler::ConnectionHandler;
pub use self::registry::{ConnectionGuard, ConnectionRegistry};
pub use self::server::{BridgeServer, STOP_TIMEOUT};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, SilentHandler};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
