//! Marshalling work onto the host's main thread.
//!
//! [`main_thread_channel`] returns a cloneable [`MainThreadScheduler`] for
//! worker threads and a single [`MainThreadQueue`] that the host's own loop
//! drains once per tick. Each submitted closure receives `&mut H` on the main
//! thread; its value (or panic message) travels back over a one-shot channel
//! that the submitter waits on with a bounded timeout.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::panic_message;

const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");

/// A unit of work executed against the host state.
pub type Task<H> = Box<dyn FnOnce(&mut H) + Send>;

type Outcome<T> = Result<T, String>;

/// Errors surfaced to the thread waiting on a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The main thread did not finish the task in time. The task may still run.
    #[error("operation timed out after {} ms waiting for the main thread", .timeout.as_millis())]
    Timeout { timeout: Duration },
    /// The host's queue is gone, so the task will never run.
    #[error("main thread is no longer accepting work")]
    HostUnavailable,
    /// The task panicked on the main thread.
    #[error("main-thread task panicked: {message}")]
    TaskPanicked { message: String },
    /// The result was already taken by an earlier wait.
    #[error("task result was already collected")]
    AlreadyCollected,
}

/// Creates a connected scheduler and queue.
///
/// `timeout` bounds [`MainThreadScheduler::run_on_main_thread`].
#[must_use]
pub fn main_thread_channel<H>(timeout: Duration) -> (MainThreadScheduler<H>, MainThreadQueue<H>) {
    let (sender, receiver) = mpsc::channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        MainThreadScheduler {
            sender,
            pending: Arc::clone(&pending),
            timeout,
        },
        MainThreadQueue { receiver, pending },
    )
}

/// Submits work to the main thread from any thread.
pub struct MainThreadScheduler<H> {
    sender: Sender<Task<H>>,
    pending: Arc<AtomicUsize>,
    timeout: Duration,
}

impl<H> Clone for MainThreadScheduler<H> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        }
    }
}

impl<H> fmt::Debug for MainThreadScheduler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadScheduler")
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<H: 'static> MainThreadScheduler<H> {
    /// The default wait bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Queues `function` and returns a handle to its eventual result.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::HostUnavailable`] when the queue has been
    /// dropped.
    pub fn submit<T, F>(&self, function: F) -> Result<PendingTask<T>, SchedulerError>
    where
        F: FnOnce(&mut H) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = mpsc::sync_channel::<Outcome<T>>(1);
        let task: Task<H> = Box::new(move |host| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| function(host)))
                .map_err(|payload| panic_message(payload.as_ref()));
            if reply.send(outcome).is_err() {
                debug!(target: SCHEDULER_TARGET, "task finished after its caller stopped waiting");
            }
        });
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::HostUnavailable);
        }
        Ok(PendingTask {
            receiver: Some(receiver),
        })
    }

    /// Runs `function` on the main thread and blocks for its result.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Timeout`] when the default bound elapses,
    /// [`SchedulerError::TaskPanicked`] when the function panics, and
    /// [`SchedulerError::HostUnavailable`] when the host has shut down.
    pub fn run_on_main_thread<T, F>(&self, function: F) -> Result<T, SchedulerError>
    where
        F: FnOnce(&mut H) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit(function)?.wait(self.timeout)
    }
}

/// Handle to a submitted task's result.
#[derive(Debug)]
pub struct PendingTask<T> {
    receiver: Option<Receiver<Outcome<T>>>,
}

impl<T> PendingTask<T> {
    /// Blocks up to `timeout` for the result.
    ///
    /// A timed-out wait may be retried. Once a result (or failure) has been
    /// delivered, later waits return [`SchedulerError::AlreadyCollected`].
    ///
    /// # Errors
    ///
    /// See [`SchedulerError`].
    pub fn wait(&mut self, timeout: Duration) -> Result<T, SchedulerError> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or(SchedulerError::AlreadyCollected)?;
        match receiver.recv_timeout(timeout) {
            Ok(outcome) => {
                self.receiver = None;
                outcome.map_err(|message| SchedulerError::TaskPanicked { message })
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: SCHEDULER_TARGET,
                    timeout_ms = timeout.as_millis(),
                    "main-thread task timed out"
                );
                Err(SchedulerError::Timeout { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.receiver = None;
                Err(SchedulerError::HostUnavailable)
            }
        }
    }

    /// Returns true once the result has been taken.
    #[must_use]
    pub const fn is_collected(&self) -> bool {
        self.receiver.is_none()
    }
}

/// The main thread's end of the channel.
pub struct MainThreadQueue<H> {
    receiver: Receiver<Task<H>>,
    pending: Arc<AtomicUsize>,
}

impl<H> fmt::Debug for MainThreadQueue<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadQueue")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<H> MainThreadQueue<H> {
    /// Runs queued tasks until the queue is empty. Returns how many ran.
    pub fn drain(&self, host: &mut H) -> usize {
        self.drain_with_budget(host, usize::MAX)
    }

    /// Runs at most `budget` queued tasks. Returns how many ran.
    pub fn drain_with_budget(&self, host: &mut H, budget: usize) -> usize {
        let mut ran = 0;
        while ran < budget {
            match self.receiver.try_recv() {
                Ok(task) => {
                    self.run(task, host);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Blocks up to `timeout` for the first task, then drains the rest.
    ///
    /// Suits host loops that would otherwise sleep between ticks.
    pub fn wait_and_drain(&self, host: &mut H, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                self.run(task, host);
                1 + self.drain(host)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Number of submitted tasks not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns true when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    fn run(&self, task: Task<H>, host: &mut H) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        task(host);
    }
}
