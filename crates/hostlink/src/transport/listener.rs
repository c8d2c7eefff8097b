//! TCP listener for the bridge.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionRegistry, LISTENER_TARGET, ListenerError};
use crate::health::HealthReporter;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a TCP address.
#[derive(Debug)]
pub(crate) struct SocketListener {
    addr: SocketAddr,
    listener: TcpListener,
}

/// Collaborators shared by the accept loop and every connection thread.
pub(crate) struct ListenerContext {
    pub(crate) handler: Arc<dyn ConnectionHandler>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

impl SocketListener {
    pub(crate) fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        let listener = bind_tcp(host, port)?;
        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        Ok(Self { addr, listener })
    }

    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn start(self, context: ListenerContext) -> Result<ListenerHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let (finished, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("hostlink-accept".to_owned())
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &context, finished))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
            done,
        })
    }
}

/// Handle to the background listener thread.
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    done: Receiver<()>,
}

impl ListenerHandle {
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => Ok(()),
                Err(_) => Err(ListenerError::ThreadPanic),
            }
        } else {
            Ok(())
        }
    }

    /// Waits at most `timeout` for the accept loop to exit.
    ///
    /// On timeout the thread is left detached; it exits on its next poll.
    pub(crate) fn join_timeout(mut self, timeout: Duration) -> Result<(), ListenerError> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.take() {
                Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
                None => Ok(()),
            },
            Err(RecvTimeoutError::Timeout) => Err(ListenerError::JoinTimeout { timeout }),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    context: &ListenerContext,
    _finished: Sender<()>,
) {
    info!(
        target: LISTENER_TARGET,
        addr = %listener.addr,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some((stream, peer))) => {
                last_error = None;
                spawn_connection(stream, peer, context);
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    info!(target: LISTENER_TARGET, addr = %listener.addr, "socket listener stopped");
}

fn spawn_connection(stream: TcpStream, peer: SocketAddr, context: &ListenerContext) {
    let Some(guard) = context.registry.track(&stream) else {
        debug!(target: LISTENER_TARGET, %peer, "refusing connection during shutdown");
        return;
    };
    let handler = Arc::clone(&context.handler);
    let reporter = Arc::clone(&context.reporter);
    let spawned = thread::Builder::new()
        .name(format!("hostlink-conn-{peer}"))
        .spawn(move || {
            reporter.connection_opened(Some(peer));
            handler.handle(stream);
            drop(guard);
            reporter.connection_closed(Some(peer));
        });
    if let Err(error) = spawned {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            %peer,
            "failed to spawn connection thread"
        );
    }
}

fn accept_connection(listener: &TcpListener) -> Result<Option<(TcpStream, SocketAddr)>, io::Error> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            Ok(Some((stream, peer)))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
