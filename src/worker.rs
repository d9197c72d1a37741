//! Cooperative background workers.
//!
//! A [`Worker`] owns at most one OS thread running a [`WorkerBody`]. The body
//! receives a [`CancelToken`] and is expected to poll it at its own safe
//! points; `stop()` only raises the flag and never interrupts hardware calls.
//!
//! ```text
//!   created ──start()──▶ running ──stop()──▶ cancelling ──join()──▶ idle
//!      ▲                    │                                        │
//!      │                    └──── body returns on its own ───────────┤
//!      └─────────────────────────── start() again ◀──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use linescan_daq::worker::{CancelToken, Worker, WorkerBody};
//! use std::time::Duration;
//!
//! struct Heartbeat;
//!
//! impl WorkerBody for Heartbeat {
//!     fn name(&self) -> &str {
//!         "heartbeat"
//!     }
//!
//!     fn run(&self, cancel: &CancelToken) {
//!         while !cancel.sleep(Duration::from_millis(100)) {}
//!     }
//! }
//!
//! let worker = Worker::new(Heartbeat);
//! worker.start()?;
//! worker.stop();
//! worker.join();
//! # Ok::<(), linescan_daq::error::ScanError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{ScanError, ScanResult};

/// Longest single sleep inside [`CancelToken::sleep`].
const CANCEL_SLICE: Duration = Duration::from_millis(10);

/// Shared cancellation flag.
///
/// Clones observe the same flag. A fresh token is in the cancelled state,
/// which is also the state a worker is left in after `join()`.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the cancelled (idle) state.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a token that is not cancelled.
    pub fn active() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the cancellation request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(CANCEL_SLICE));
        }
    }
}

/// Work executed once per `start()` on a worker thread.
pub trait WorkerBody: Send + Sync + 'static {
    /// Thread name, also used in log fields.
    fn name(&self) -> &str;

    /// Run to completion, returning promptly once `cancel` is observed.
    fn run(&self, cancel: &CancelToken);
}

/// Owner of a single background thread running `B`.
pub struct Worker<B: WorkerBody> {
    body: Arc<B>,
    cancel: CancelToken,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `join()`. The handle leaves `thread` before the
    /// body has returned, so `start()` treats a held lock as a live run.
    joining: Mutex<()>,
}

impl<B: WorkerBody> Worker<B> {
    /// Wrap `body`; no thread is started.
    pub fn new(body: B) -> Self {
        Self {
            body: Arc::new(body),
            cancel: CancelToken::new(),
            thread: Mutex::new(None),
            joining: Mutex::new(()),
        }
    }

    /// Spawn the worker thread unless one is already held.
    ///
    /// A second `start()` before `join()` is a no-op, even if the previous
    /// run already finished. So is a `start()` racing a `join()` on another
    /// thread.
    pub fn start(&self) -> ScanResult<()> {
        let Some(_joining) = self.joining.try_lock() else {
            debug!(worker = self.body.name(), "Start ignored, worker is being joined");
            return Ok(());
        };
        let mut slot = self.thread.lock();
        if slot.is_some() {
            debug!(worker = self.body.name(), "Start ignored, worker already started");
            return Ok(());
        }

        self.cancel.reset();
        let body = Arc::clone(&self.body);
        let cancel = self.cancel.clone();
        let handle = thread::Builder::new()
            .name(self.body.name().to_string())
            .spawn(move || {
                body.run(&cancel);
                debug!(worker = body.name(), "Worker body returned");
            })
            .map_err(|e| {
                self.cancel.cancel();
                ScanError::Spawn(e)
            })?;

        *slot = Some(handle);
        debug!(worker = self.body.name(), "Worker started");
        Ok(())
    }

    /// Request cancellation. Does not block.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker thread exits.
    ///
    /// Leaves the worker idle and startable again. No-op if never started.
    /// Concurrent calls all wait for the same thread.
    pub fn join(&self) {
        let _joining = self.joining.lock();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                error!(worker = self.body.name(), "Worker thread panicked: {:?}", e);
            }
            debug!(worker = self.body.name(), "Worker joined");
        }
        self.cancel.cancel();
    }

    /// Whether a thread is held and has not yet finished, or is being joined.
    pub fn is_running(&self) -> bool {
        if self.joining.is_locked() {
            return true;
        }
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Whether a stop has been requested (or the worker is idle).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shared access to the body, e.g. to read results after `join()`.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Mutate the body between runs.
    ///
    /// Fails with [`ScanError::WorkerBusy`] while a thread is held.
    pub fn configure<T>(&mut self, f: impl FnOnce(&mut B) -> T) -> ScanResult<T> {
        if self.thread.get_mut().is_some() {
            return Err(ScanError::WorkerBusy);
        }
        Arc::get_mut(&mut self.body)
            .map(f)
            .ok_or(ScanError::WorkerBusy)
    }
}

impl<B: WorkerBody> Drop for Worker<B> {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
