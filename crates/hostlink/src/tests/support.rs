//! Shared fixtures for end-to-end bridge tests.
//!
//! Provides a small scene host, a handful of handlers exercising each
//! outcome class, a host loop thread standing in for the application's main
//! loop, and client helpers that speak the wire protocol.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::envelope::{ContextError, ContextProvider};
use crate::handler::{CommandHandler, HandlerError, HandlerResult, Params};
use crate::health::HealthReporter;
use crate::router::CommandRouter;
use crate::scheduler::{MainThreadQueue, main_thread_channel};
use crate::transport::{BridgeServer, Frame, ListenerError, MessageBuffer};
use crate::validation::{FieldRule, Schema, ValueKind, predicates::positive_frame};

pub(crate) const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(5);

/// Minimal scene model owned by the host loop.
#[derive(Debug)]
pub(crate) struct SceneStub {
    pub(crate) name: String,
    pub(crate) objects: Vec<String>,
    pub(crate) frame: i64,
}

impl Default for SceneStub {
    fn default() -> Self {
        Self {
            name: "Scene".to_owned(),
            objects: vec!["Camera".to_owned(), "Cube".to_owned(), "Light".to_owned()],
            frame: 1,
        }
    }
}

impl ContextProvider for SceneStub {
    fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
        let mut context = Map::new();
        context.insert("scene".to_owned(), json!(self.name));
        context.insert("frame_current".to_owned(), json!(self.frame));
        Ok(context)
    }
}

pub(crate) struct SceneInfo;

impl CommandHandler<SceneStub> for SceneInfo {
    fn command_name(&self) -> &str {
        "get_scene_info"
    }

    fn execute(&self, _params: &Params, host: &mut SceneStub) -> HandlerResult {
        Ok(json!({
            "name": host.name,
            "object_count": host.objects.len(),
            "objects": host.objects,
        })
        .into())
    }
}

pub(crate) struct SetFrame;

impl CommandHandler<SceneStub> for SetFrame {
    fn command_name(&self) -> &str {
        "set_current_frame"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field(
            "frame",
            FieldRule::required(ValueKind::Integer).with_validator(positive_frame),
        )
    }

    fn execute(&self, params: &Params, host: &mut SceneStub) -> HandlerResult {
        let frame = params
            .get("frame")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandlerError::invalid_parameter("frame must be an integer"))?;
        host.frame = frame;
        Ok(json!({"frame": frame}).into())
    }
}

/// Returns its parameters unchanged.
pub(crate) struct Echo;

impl CommandHandler<SceneStub> for Echo {
    fn command_name(&self) -> &str {
        "echo"
    }

    fn execute(&self, params: &Params, _host: &mut SceneStub) -> HandlerResult {
        Ok(Value::Object(params.clone()).into())
    }
}

/// Panics with the `message` parameter.
pub(crate) struct Explode;

impl CommandHandler<SceneStub> for Explode {
    fn command_name(&self) -> &str {
        "explode"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field("message", FieldRule::required(ValueKind::String))
    }

    fn execute(&self, params: &Params, _host: &mut SceneStub) -> HandlerResult {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("boom")
            .to_owned();
        panic!("{message}");
    }
}

/// Blocks the main thread for `millis`.
pub(crate) struct Stall;

impl CommandHandler<SceneStub> for Stall {
    fn command_name(&self) -> &str {
        "stall"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field("millis", FieldRule::required(ValueKind::Integer))
    }

    fn execute(&self, params: &Params, _host: &mut SceneStub) -> HandlerResult {
        let millis = params.get("millis").and_then(Value::as_u64).unwrap_or(0);
        thread::sleep(Duration::from_millis(millis));
        Ok(json!({"stalled_ms": millis}).into())
    }
}

pub(crate) fn scene_router() -> CommandRouter<SceneStub> {
    let mut router = CommandRouter::new();
    router.register_handler(SceneInfo);
    router.register_handler(SetFrame);
    router.register_handler(Echo);
    router.register_handler(Explode);
    router.register_handler(Stall);
    router
}

/// Background thread standing in for the host application's main loop.
pub(crate) struct HostLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<SceneStub>>,
}

impl HostLoop {
    pub(crate) fn spawn(queue: MainThreadQueue<SceneStub>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut scene = SceneStub::default();
            while !flag.load(Ordering::SeqCst) {
                queue.wait_and_drain(&mut scene, TICK);
            }
            scene
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the loop and returns the final host state.
    pub(crate) fn finish(mut self) -> Option<SceneStub> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.take().and_then(|handle| handle.join().ok())
    }
}

impl Drop for HostLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    Starting,
    Listening,
    StartFailed,
    Stopped,
    ConnectionOpened,
    ConnectionClosed,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn server_starting(&self, _host: &str, _port: u16) {
        self.record(HealthEvent::Starting);
    }

    fn server_listening(&self, _addr: SocketAddr) {
        self.record(HealthEvent::Listening);
    }

    fn server_start_failed(&self, _error: &ListenerError) {
        self.record(HealthEvent::StartFailed);
    }

    fn server_stopped(&self, _closed_connections: usize) {
        self.record(HealthEvent::Stopped);
    }

    fn connection_opened(&self, _peer: Option<SocketAddr>) {
        self.record(HealthEvent::ConnectionOpened);
    }

    fn connection_closed(&self, _peer: Option<SocketAddr>) {
        self.record(HealthEvent::ConnectionClosed);
    }
}

/// A running server with an optional host loop.
pub(crate) struct Bridge {
    pub(crate) server: BridgeServer<SceneStub>,
    pub(crate) host: Option<HostLoop>,
    pub(crate) reporter: Arc<RecordingHealthReporter>,
    pub(crate) addr: SocketAddr,
    parked_queue: Option<MainThreadQueue<SceneStub>>,
}

impl Bridge {
    /// Starts a server on an ephemeral port. When `drain` is false nothing
    /// services the main-thread queue, so every command times out.
    pub(crate) fn start(task_timeout: Duration, drain: bool) -> Self {
        let (scheduler, queue) = main_thread_channel(task_timeout);
        let reporter = Arc::new(RecordingHealthReporter::default());
        let mut server =
            BridgeServer::new(scene_router(), scheduler).with_reporter(Arc::clone(&reporter));
        let addr = server.start("127.0.0.1", 0).expect("start bridge server");
        let (host, parked_queue) = if drain {
            (Some(HostLoop::spawn(queue)), None)
        } else {
            (None, Some(queue))
        };
        Self {
            server,
            host,
            reporter,
            addr,
            parked_queue,
        }
    }

    pub(crate) fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect client");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("set read timeout");
        stream
    }

    /// Number of commands queued but never run.
    pub(crate) fn parked_commands(&self) -> usize {
        self.parked_queue.as_ref().map_or(0, MainThreadQueue::pending)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.server.stop();
        self.host = None;
    }
}

pub(crate) fn send(stream: &mut TcpStream, request: &Value) {
    let bytes = serde_json::to_vec(request).expect("encode request");
    stream.write_all(&bytes).expect("write request");
    stream.flush().expect("flush request");
}

/// Reads one response document, or `None` if the connection closed or timed
/// out first.
pub(crate) fn try_read_envelope(stream: &mut TcpStream) -> Option<Value> {
    let mut buffer = MessageBuffer::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = stream.read(&mut chunk).ok().filter(|read| *read > 0)?;
        if let Frame::Complete(document) = buffer.push(&chunk[..read]) {
            return Some(document);
        }
    }
}

pub(crate) fn read_envelope(stream: &mut TcpStream) -> Value {
    try_read_envelope(stream).expect("response envelope")
}

pub(crate) fn request(stream: &mut TcpStream, request: &Value) -> Value {
    send(stream, request);
    read_envelope(stream)
}
