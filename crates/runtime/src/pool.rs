//! Worker thread pool for concurrent decode tasks.
//!
//! All workers drain one shared channel, so tasks start in submission
//! order but run concurrently. The pool does no admission control of
//! its own; bounding in-flight work is the caller's job.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::runner::Task;

/// Handle to a fixed-size worker pool. Cheap to clone; threads live
/// until the last handle is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    size: usize,
    tx: Mutex<Option<Sender<Task>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` worker threads (clamped to at least one).
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn a thread; workers
    /// already spawned exit once the channel disconnects.
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = channel::unbounded::<Task>();

        let threads = (0..size)
            .map(|index| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("px-worker-{index}"))
                    .spawn(move || worker_loop(index, rx))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                size,
                tx: Mutex::new(Some(tx)),
                threads: Mutex::new(threads),
            }),
        })
    }

    /// Enqueue a closure for execution on any worker thread.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        let guard = self.inner.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Box::new(task)).is_err() {
                    warn!("worker task dropped: pool threads are gone");
                }
            }
            None => warn!("worker task dropped: pool shut down"),
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Whether the calling thread belongs to this pool.
    pub fn is_current(&self) -> bool {
        let current = thread::current().id();
        self.inner
            .threads
            .lock()
            .iter()
            .any(|handle| handle.thread().id() == current)
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        *self.tx.get_mut() = None;
        let current = thread::current().id();
        for handle in self.threads.get_mut().drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.inner.size)
            .finish()
    }
}

fn worker_loop(index: usize, rx: Receiver<Task>) {
    while let Ok(task) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(worker = index, "task panicked on worker thread");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn size_is_clamped_to_one() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn executes_all_tasks() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel::bounded(64);

        for _ in 0..64 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            });
        }
        for _ in 0..64 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn tasks_run_concurrently() {
        let pool = WorkerPool::new(2).unwrap();
        // Zero-capacity channel: the send only completes if the second
        // task is running at the same time to receive it.
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::bounded(2);

        let done_a = done_tx.clone();
        pool.post(move || {
            gate_tx.send(()).unwrap();
            let _ = done_a.send(());
        });
        let done_b = done_tx;
        pool.post(move || {
            gate_rx.recv().unwrap();
            let _ = done_b.send(());
        });

        for _ in 0..2 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("both tasks should rendezvous");
        }
    }

    #[test]
    fn is_current_from_worker() {
        let pool = WorkerPool::new(1).unwrap();
        assert!(!pool.is_current());

        let (tx, rx) = channel::bounded(1);
        let probe = pool.clone();
        pool.post(move || {
            let _ = tx.send(probe.is_current());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn survives_a_panicking_task() {
        let pool = WorkerPool::new(1).unwrap();
        pool.post(|| panic!("boom"));

        let (tx, rx) = channel::bounded(1);
        pool.post(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("pool should keep executing after a panic");
    }
}
