//! The engine's executor bundle: UI runner, IO runner, worker pool.

use std::io;
use std::thread;

use crate::pool::WorkerPool;
use crate::runner::TaskRunner;

/// The three executors the codec pipeline is threaded across.
///
/// `ui` hosts codec state transitions and result callbacks, `io` hosts
/// GPU uploads, and `workers` host admitted decode tasks.
#[derive(Clone, Debug)]
pub struct TaskRunners {
    ui: TaskRunner,
    io: TaskRunner,
    workers: WorkerPool,
}

impl TaskRunners {
    /// Spawn the executor bundle. `worker_threads == 0` sizes the pool
    /// to the number of available cores.
    ///
    /// # Errors
    ///
    /// Returns an error if any executor thread fails to spawn.
    pub fn new(worker_threads: usize) -> io::Result<Self> {
        let worker_threads = if worker_threads == 0 {
            thread::available_parallelism().map_or(2, |n| n.get())
        } else {
            worker_threads
        };
        Ok(Self {
            ui: TaskRunner::new("px-ui")?,
            io: TaskRunner::new("px-io")?,
            workers: WorkerPool::new(worker_threads)?,
        })
    }

    pub fn ui(&self) -> &TaskRunner {
        &self.ui
    }

    pub fn io(&self) -> &TaskRunner {
        &self.io
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }
}
