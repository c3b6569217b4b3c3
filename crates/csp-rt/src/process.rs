//! The unit of concurrent execution.
//!
//! A process wraps a user body (`FnOnce() -> Result<()>`) together with the
//! explicit capture set of channels, processes, and combinators its body can
//! reach. Each started process runs on its own OS thread; the visible
//! lifecycle is created -> running -> exited, with exited absorbing.
//!
//! ## Exit handling
//!
//! - The body returns `Ok(())`: the process exits normally.
//! - The body fails with the poison signal: the runtime walks the capture
//!   set, poisoning every reachable channel, then exits `Poisoned`. Poison
//!   never reaches user code as a recoverable error beyond the `?` that
//!   carried it out of the body.
//! - Any other error, or a panic, is forwarded to the host-provided fault
//!   sink and the process exits `Faulted` without poisoning anything.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{CspError, Result};
use crate::poison::{Captures, PoisonWalk, Poisonable};

// ---------------------------------------------------------------------------
// ProcessId
// ---------------------------------------------------------------------------

/// Unique identifier for a process.
///
/// Assigned sequentially from a global atomic counter, guaranteeing
/// uniqueness within a single runtime instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// Generate a fresh, globally unique process id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ProcessId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

// ---------------------------------------------------------------------------
// ProcessState / ExitReason
// ---------------------------------------------------------------------------

/// The execution state of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Constructed but not yet started.
    Created,
    /// The body is executing (or blocked on a channel).
    Running,
    /// Terminated with the given reason. Absorbing.
    Exited(ExitReason),
}

/// Why a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The body returned.
    Normal,
    /// The body observed the poison signal; its captures were poisoned.
    Poisoned,
    /// The body failed with a non-poison error or panicked; the fault was
    /// reported to the fault sink.
    Faulted,
}

// ---------------------------------------------------------------------------
// Fault sink
// ---------------------------------------------------------------------------

/// Host-provided sink for non-poison process faults.
pub type FaultSink = Box<dyn Fn(ProcessId, &str) + Send + Sync>;

static FAULT_SINK: OnceLock<FaultSink> = OnceLock::new();

/// Install the host fault sink. May be called at most once; returns the
/// rejected sink if one is already installed.
///
/// Without a sink, faults are logged at error level.
pub fn set_fault_sink(sink: FaultSink) -> std::result::Result<(), FaultSink> {
    FAULT_SINK.set(sink)
}

fn report_fault(pid: ProcessId, message: &str) {
    match FAULT_SINK.get() {
        Some(sink) => sink(pid, message),
        None => error!(process = %pid, message, "process fault"),
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

type Body = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Inner {
    id: ProcessId,
    state: Mutex<ProcessState>,
    captures: Captures,
    /// Taken by the first `start`; `None` afterwards.
    body: Mutex<Option<Body>>,
    /// Moved into the body thread by `start` and dropped when it exits,
    /// which is what `join` observes as completion.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

/// A unit of concurrent execution wrapping a user body and its captures.
///
/// Cloning the handle shares the same process; any clone may start, join,
/// or terminate it.
pub struct Process {
    inner: Arc<Inner>,
}

impl Clone for Process {
    fn clone(&self) -> Self {
        Process {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Process {
    /// Create a process with an empty capture set.
    ///
    /// A body that can observe poison should declare its channels via
    /// [`with_captures`](Self::with_captures) instead, or the signal will
    /// stop with this process rather than propagate.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self::with_captures(Captures::new(), body)
    }

    /// Create a process declaring the capture set its body can reach.
    pub fn with_captures<F>(captures: Captures, body: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (done_tx, done_rx) = bounded::<()>(0);
        Process {
            inner: Arc::new(Inner {
                id: ProcessId::next(),
                state: Mutex::new(ProcessState::Created),
                captures,
                body: Mutex::new(Some(Box::new(body))),
                done_tx: Mutex::new(Some(done_tx)),
                done_rx,
                handle: Mutex::new(None),
            }),
        }
    }

    /// This process's identifier.
    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> ProcessState {
        self.inner.state.lock().clone()
    }

    /// The capture set declared at construction.
    pub fn captures(&self) -> &Captures {
        &self.inner.captures
    }

    /// Begin concurrent execution of the body. Idempotent: a second call is
    /// a no-op.
    pub fn start(&self) {
        let Some(body) = self.inner.body.lock().take() else {
            return;
        };
        let done_tx = self.inner.done_tx.lock().take();
        *self.inner.state.lock() = ProcessState::Running;
        debug!(process = %self.inner.id, "process started");

        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || {
            run_body(&inner, body);
            drop(done_tx);
        });
        *self.inner.handle.lock() = Some(handle);
    }

    /// Wait for the process to terminate. No-op if not yet started.
    pub fn join(&self) {
        if !self.has_started() {
            return;
        }
        // The sender half is dropped when the body thread exits.
        let _ = self.inner.done_rx.recv();
        self.reap();
    }

    /// Wait up to `timeout` for the process to terminate.
    ///
    /// Returns `true` if the process has exited, `false` on timeout or if
    /// the process was never started.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        if !self.has_started() {
            return false;
        }
        match self.inner.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => {
                self.reap();
                true
            }
        }
    }

    /// Force-stop a running process. No-op if not running.
    ///
    /// OS threads cannot be killed externally, so termination is the
    /// cooperative kind this runtime is built on: the process's capture set
    /// is poisoned, and the body fails with the poison signal at its next
    /// channel touch.
    pub fn terminate(&self) {
        if !matches!(self.state(), ProcessState::Running) {
            return;
        }
        debug!(process = %self.inner.id, "terminate requested, poisoning captures");
        self.inner.captures.poison_all();
    }

    /// Completion signal: the receiver disconnects when the body thread
    /// exits. Lets combinators race several children's completions.
    pub(crate) fn done_receiver(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    fn has_started(&self) -> bool {
        !matches!(*self.inner.state.lock(), ProcessState::Created)
    }

    fn reap(&self) {
        if let Some(handle) = self.inner.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_body(inner: &Arc<Inner>, body: Body) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    let reason = match outcome {
        Ok(Ok(())) => ExitReason::Normal,
        Ok(Err(CspError::Poisoned)) => {
            debug!(process = %inner.id, "poison observed, walking captures");
            inner.captures.poison_all();
            ExitReason::Poisoned
        }
        Ok(Err(err)) => {
            report_fault(inner.id, &err.to_string());
            ExitReason::Faulted
        }
        Err(payload) => {
            report_fault(inner.id, &panic_message(&payload));
            ExitReason::Faulted
        }
    };
    debug!(process = %inner.id, reason = ?reason, "process exited");
    *inner.state.lock() = ProcessState::Exited(reason);
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "process panicked".to_string()
    }
}

impl Poisonable for Process {
    fn poison_walk(&self, walk: &mut PoisonWalk) {
        if walk.mark(Arc::as_ptr(&self.inner) as usize) {
            self.inner.captures.poison_walk(walk);
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("captures", &self.inner.captures.len())
            .finish()
    }
}
