//! Tracking of live client connections.
//!
//! The registry keeps a clone of every accepted stream so that shutdown can
//! force-close connections whose threads are blocked in a read. Each
//! connection thread holds a [`ConnectionGuard`] that deregisters it on drop.

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::LISTENER_TARGET;

#[derive(Debug, Default)]
struct Slots {
    streams: HashMap<u64, TcpStream>,
    next_id: u64,
    closed: bool,
}

/// Shared set of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    slots: Mutex<Slots>,
}

impl ConnectionRegistry {
    /// An open, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `stream`.
    ///
    /// Returns `None` when the registry has been closed or the stream cannot
    /// be cloned; the caller should drop the connection.
    pub fn track(self: &Arc<Self>, stream: &TcpStream) -> Option<ConnectionGuard> {
        let clone = match stream.try_clone() {
            Ok(clone) => clone,
            Err(error) => {
                debug!(target: LISTENER_TARGET, %error, "failed to clone accepted stream");
                return None;
            }
        };
        let mut slots = self.lock();
        if slots.closed {
            return None;
        }
        let id = slots.next_id;
        slots.next_id += 1;
        slots.streams.insert(id, clone);
        Some(ConnectionGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    /// Shuts down every tracked stream and refuses new ones.
    ///
    /// Returns how many streams were closed.
    pub fn close_all(&self) -> usize {
        let streams: Vec<TcpStream> = {
            let mut slots = self.lock();
            slots.closed = true;
            slots.streams.drain().map(|(_, stream)| stream).collect()
        };
        for stream in &streams {
            if let Err(error) = stream.shutdown(Shutdown::Both) {
                debug!(target: LISTENER_TARGET, %error, "connection already closed");
            }
        }
        streams.len()
    }

    /// Accepts new connections again after [`close_all`](Self::close_all).
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().streams.len()
    }

    /// Returns true when no connections are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: u64) {
        self.lock().streams.remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters a connection when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
