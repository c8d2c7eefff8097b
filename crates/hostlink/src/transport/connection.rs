//! Per-client request loop.
//!
//! Reads chunks into a [`MessageBuffer`]; each complete document is routed on
//! the main thread through the scheduler and its envelope written back before
//! the next document is framed.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::framing::{Frame, MessageBuffer};
use super::{ConnectionHandler, LISTENER_TARGET};
use crate::envelope::{ContextProvider, Envelope, ResponseBuilder};
use crate::error_code::ErrorCode;
use crate::router::CommandRouter;
use crate::scheduler::{MainThreadScheduler, SchedulerError};

/// Size of each socket read.
pub const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The client closed its side.
    ClientClosed,
    /// Reading from the socket failed.
    ReadFailed,
    /// Writing a response failed.
    WriteFailed,
    /// A message outgrew the framing bound.
    Overflow,
    /// The host stopped draining work.
    HostUnavailable,
}

/// Serves bridge requests on accepted connections.
pub struct CommandConnectionHandler<H: ContextProvider + 'static> {
    router: Arc<CommandRouter<H>>,
    scheduler: MainThreadScheduler<H>,
}

impl<H: ContextProvider + 'static> CommandConnectionHandler<H> {
    /// Routes through `router` on the thread behind `scheduler`.
    pub fn new(router: Arc<CommandRouter<H>>, scheduler: MainThreadScheduler<H>) -> Self {
        Self { router, scheduler }
    }

    /// Runs the request loop until the stream ends.
    pub fn serve<S: Read + Write>(&self, stream: &mut S) -> ConnectionEnd {
        let mut buffer = MessageBuffer::new();
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            let read = match read_with_retry(stream, &mut chunk) {
                Ok(0) => return ConnectionEnd::ClientClosed,
                Ok(read) => read,
                Err(error) => {
                    debug!(target: LISTENER_TARGET, %error, "connection read failed");
                    return ConnectionEnd::ReadFailed;
                }
            };
            let Some(received) = chunk.get(..read) else {
                return ConnectionEnd::ReadFailed;
            };

            let request = match buffer.push(received) {
                Frame::Incomplete => continue,
                Frame::Overflow { size } => {
                    warn!(
                        target: LISTENER_TARGET,
                        size,
                        "message exceeds buffer limit, closing connection"
                    );
                    return ConnectionEnd::Overflow;
                }
                Frame::Complete(request) => request,
            };

            let envelope = match self.execute(request) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(error) => {
                    info!(target: LISTENER_TARGET, %error, "closing connection");
                    return ConnectionEnd::HostUnavailable;
                }
            };
            if let Err(error) = write_envelope(stream, &envelope) {
                debug!(target: LISTENER_TARGET, %error, "failed to send response");
                return ConnectionEnd::WriteFailed;
            }
        }
    }

    fn execute(&self, request: Value) -> Result<Option<Envelope>, SchedulerError> {
        let router = Arc::clone(&self.router);
        match self
            .scheduler
            .run_on_main_thread(move |host| router.route_command(&request, host))
        {
            Ok(envelope) => Ok(Some(envelope)),
            Err(SchedulerError::Timeout { timeout }) => {
                warn!(
                    target: LISTENER_TARGET,
                    timeout_ms = timeout.as_millis(),
                    "dropping response for command that outlived its timeout"
                );
                Ok(None)
            }
            Err(SchedulerError::TaskPanicked { message }) => Ok(Some(
                ResponseBuilder::detached().error(
                    ErrorCode::UnknownError,
                    format!("Error executing command: {message}"),
                ),
            )),
            Err(error) => Err(error),
        }
    }
}

impl<H: ContextProvider + 'static> ConnectionHandler for CommandConnectionHandler<H> {
    fn handle(&self, mut stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        let end = self.serve(&mut stream);
        debug!(target: LISTENER_TARGET, ?peer, ?end, "connection loop finished");
    }
}

fn read_with_retry<R: Read>(stream: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn write_envelope<W: Write>(stream: &mut W, envelope: &Envelope) -> io::Result<()> {
    let bytes = envelope.to_bytes().map_err(io::Error::other)?;
    stream.write_all(&bytes)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::thread;
    use std::time::{Duration, Instant};

    use rstest::rstest;
    use serde_json::{Map, json};

    use super::*;
    use crate::envelope::ContextError;
    use crate::handler::{CommandHandler, HandlerResult, Params};
    use crate::scheduler::{MainThreadQueue, main_thread_channel};
    use crate::transport::framing::MAX_MESSAGE_BYTES;

    #[derive(Default)]
    struct Host {
        calls: u32,
    }

    impl ContextProvider for Host {
        fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
            Ok(Map::new())
        }
    }

    struct Ping;

    impl CommandHandler<Host> for Ping {
        fn command_name(&self) -> &str {
            "ping"
        }

        fn execute(&self, _params: &Params, host: &mut Host) -> HandlerResult {
            host.calls += 1;
            Ok(json!({"calls": host.calls}).into())
        }
    }

    /// In-memory stream fed from scripted reads.
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        fail_writes: bool,
    }

    impl ScriptedStream {
        fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                written: Vec::new(),
                fail_writes: false,
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(error)) => Err(error),
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn handler(timeout: Duration) -> (CommandConnectionHandler<Host>, MainThreadQueue<Host>) {
        let mut router = CommandRouter::new();
        router.register_handler(Ping);
        let (scheduler, queue) = main_thread_channel(timeout);
        (CommandConnectionHandler::new(Arc::new(router), scheduler), queue)
    }

    fn spawn_host(queue: MainThreadQueue<Host>, expected: u32) -> thread::JoinHandle<Host> {
        thread::spawn(move || {
            let mut host = Host::default();
            let deadline = Instant::now() + Duration::from_secs(5);
            while host.calls < expected && Instant::now() < deadline {
                queue.wait_and_drain(&mut host, Duration::from_millis(20));
            }
            host
        })
    }

    #[rstest]
    fn fragmented_requests_get_one_response_each() {
        let (handler, queue) = handler(Duration::from_secs(5));
        let host = spawn_host(queue, 2);
        let mut stream = ScriptedStream::new([
            Ok(b"{\"type\":".to_vec()),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(b"\"ping\"}".to_vec()),
            Ok(b"{\"type\":\"ping\"}".to_vec()),
        ]);

        assert_eq!(handler.serve(&mut stream), ConnectionEnd::ClientClosed);
        let responses: Vec<Value> = serde_json::Deserializer::from_slice(&stream.written)
            .into_iter::<Value>()
            .collect::<Result<_, _>>()
            .expect("decode responses");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["calls"], 1);
        assert_eq!(responses[1]["result"]["calls"], 2);
        assert_eq!(host.join().expect("join host").calls, 2);
    }

    #[rstest]
    fn oversized_message_closes_the_connection() {
        let (handler, _queue) = handler(Duration::from_secs(5));
        let oversized = vec![b'['; READ_CHUNK_BYTES];
        let reads = (0..=(MAX_MESSAGE_BYTES / READ_CHUNK_BYTES))
            .map(|_| Ok(oversized.clone()));
        let mut stream = ScriptedStream::new(reads);
        assert_eq!(handler.serve(&mut stream), ConnectionEnd::Overflow);
        assert!(stream.written.is_empty());
    }

    #[rstest]
    fn timeout_writes_nothing_and_keeps_reading() {
        let (handler, queue) = handler(Duration::from_millis(30));
        let mut stream = ScriptedStream::new([Ok(b"{\"type\":\"ping\"}".to_vec())]);
        assert_eq!(handler.serve(&mut stream), ConnectionEnd::ClientClosed);
        assert!(stream.written.is_empty());
        assert_eq!(queue.pending(), 1);
    }

    #[rstest]
    fn missing_host_closes_the_connection() {
        let (handler, queue) = handler(Duration::from_secs(5));
        drop(queue);
        let mut stream = ScriptedStream::new([
            Ok(b"{\"type\":\"ping\"}".to_vec()),
            Ok(b"{\"type\":\"ping\"}".to_vec()),
        ]);
        assert_eq!(handler.serve(&mut stream), ConnectionEnd::HostUnavailable);
    }

    #[rstest]
    fn write_failure_ends_the_loop() {
        let (handler, queue) = handler(Duration::from_secs(5));
        let host = spawn_host(queue, 1);
        let mut stream = ScriptedStream::new([
            Ok(b"{\"type\":\"ping\"}".to_vec()),
            Ok(b"{\"type\":\"ping\"}".to_vec()),
        ]);
        stream.fail_writes = true;
        assert_eq!(handler.serve(&mut stream), ConnectionEnd::WriteFailed);
        assert_eq!(stream.reads.len(), 1);
        assert_eq!(host.join().expect("join host").calls, 1);
    }
}
