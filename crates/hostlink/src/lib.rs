//! Command execution bridge between remote clients and a single-threaded host.
//!
//! A host application whose state may only be touched from its own main
//! thread embeds a [`BridgeServer`]. Clients connect over TCP and send one
//! JSON document per request:
//!
//! ```json
//! {"type": "set_current_frame", "params": {"frame": 24}}
//! ```
//!
//! Each connection runs on its own thread. Complete documents are handed to
//! the [`MainThreadScheduler`], which queues them for the host; the host's loop
//! drains the [`MainThreadQueue`] once per tick, and the [`CommandRouter`]
//! dispatches each request to a [`CommandHandler`] with `&mut H` access to the
//! host state. The handler's outcome is wrapped in an [`Envelope`] and written
//! back on the connection thread.
//!
//! Handlers declare parameter [`Schema`]s; parameters are validated before
//! `execute` runs, and every failure becomes a structured error envelope with
//! a stable [`ErrorCode`] instead of unwinding into the host.

mod command;
mod envelope;
mod error_code;
mod handler;
pub mod health;
mod router;
mod scheduler;
pub mod telemetry;
mod transport;
pub mod validation;

use std::any::Any;

pub use command::{Command, CommandError};
pub use envelope::{
    ContextError, ContextProvider, Envelope, ErrorBody, NoContext, Progress, ResponseBuilder,
    Status, Warning,
};
pub use error_code::{ErrorCode, suggestions_for};
pub use handler::{CommandHandler, HandlerError, HandlerResult, Params, Reply};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use router::{CommandRouter, HandlerFactory};
pub use scheduler::{
    MainThreadQueue, MainThreadScheduler, PendingTask, SchedulerError, Task, main_thread_channel,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    BridgeServer, CommandConnectionHandler, ConnectionEnd, ConnectionGuard, ConnectionHandler,
    ConnectionRegistry, Frame, ListenerError, MAX_MESSAGE_BYTES, MessageBuffer, READ_CHUNK_BYTES,
    STOP_TIMEOUT,
};
pub use validation::{FieldRule, Schema, ValidationError, ValueKind, validate};

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests;
