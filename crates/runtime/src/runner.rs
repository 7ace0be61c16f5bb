//! Single-threaded task executor.
//!
//! A `TaskRunner` owns one named thread draining a crossbeam channel of
//! closures. Posting never blocks; tasks run in FIFO order on the
//! runner's thread. Dropping the last handle disconnects the channel,
//! lets the thread drain what was already queued, and joins it.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, warn};

/// A unit of work posted to a runner.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a single-threaded executor. Cheap to clone; the backing
/// thread lives until the last handle is dropped.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    name: String,
    thread_id: ThreadId,
    tx: Mutex<Option<Sender<Task>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TaskRunner {
    /// Spawn the runner thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread (for
    /// example on thread-limit exhaustion).
    pub fn new(name: &str) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Task>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_loop(&thread_name, rx))?;
        let thread_id = handle.thread().id();

        Ok(Self {
            inner: Arc::new(RunnerInner {
                name: name.to_string(),
                thread_id,
                tx: Mutex::new(Some(tx)),
                join: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Enqueue a closure for execution on the runner thread.
    ///
    /// Posting after shutdown drops the task (with a warning); tasks
    /// posted from the runner's own thread are queued behind the one
    /// currently executing.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        let guard = self.inner.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Box::new(task)).is_err() {
                    warn!(runner = %self.inner.name, "task dropped: runner thread is gone");
                }
            }
            None => {
                warn!(runner = %self.inner.name, "task dropped: runner shut down");
            }
        }
    }

    /// Whether the calling thread is this runner's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// The runner's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl Drop for RunnerInner {
    fn drop(&mut self) {
        // Disconnect first so the loop drains queued tasks and exits.
        *self.tx.get_mut() = None;
        if let Some(handle) = self.join.get_mut().take() {
            // A runner task may itself own the last handle; joining our
            // own thread would deadlock.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.inner.name)
            .finish()
    }
}

fn run_loop(name: &str, rx: Receiver<Task>) {
    while let Ok(task) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(runner = %name, "task panicked on runner thread");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
