//! Admission-controlled scheduling of decode tasks over the worker pool.
//!
//! Decode working sets dominate transient memory, so tasks are admitted
//! against a device budget instead of being thrown at the pool
//! directly. Each task declares an approximate cost up front; the
//! coordinator dispatches it immediately when the budget allows and
//! queues it FIFO otherwise. Costs stay committed until the task's
//! [`DecodePermit`] is finished, which may happen on a different runner
//! than the one that decoded (uploads finish on the IO runner).
//!
//! Admission rules:
//! - at most `cpu_core_count` tasks run at once,
//! - a new task starts only while committed memory is below
//!   `max_memory_in_flight`,
//! - an idle coordinator always admits, so a single task larger than
//!   the whole budget still runs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use px_runtime::WorkerPool;
use tracing::warn;

use crate::device::DeviceCapacity;

/// A decode task: receives the permit it must finish.
pub type DecodeTask = Box<dyn FnOnce(DecodePermit) + Send + 'static>;

/// Admission-controlled gate over the worker pool.
pub struct DecodeCoordinator {
    workers: WorkerPool,
    state: Mutex<CoordinatorState>,
}

struct CoordinatorState {
    capacity: DeviceCapacity,
    in_flight_memory: u64,
    in_flight_count: u32,
    queue: VecDeque<QueuedTask>,
}

struct QueuedTask {
    cost: u64,
    task: DecodeTask,
}

impl CoordinatorState {
    fn admissible(&self) -> bool {
        if self.in_flight_count == 0 {
            return true;
        }
        self.in_flight_count < self.capacity.cpu_core_count
            && self.in_flight_memory < self.capacity.max_memory_in_flight
    }

    fn commit(&mut self, cost: u64) {
        self.in_flight_memory += cost;
        self.in_flight_count += 1;
    }

    /// Pop every queued task that fits under the current budgets.
    fn drain_admissible(&mut self) -> Vec<QueuedTask> {
        let mut admitted = Vec::new();
        while self.admissible() {
            match self.queue.pop_front() {
                Some(queued) => {
                    self.commit(queued.cost);
                    admitted.push(queued);
                }
                None => break,
            }
        }
        admitted
    }
}

impl DecodeCoordinator {
    pub fn new(workers: WorkerPool, capacity: DeviceCapacity) -> Arc<Self> {
        Arc::new(Self {
            workers,
            state: Mutex::new(CoordinatorState {
                capacity,
                in_flight_memory: 0,
                in_flight_count: 0,
                queue: VecDeque::new(),
            }),
        })
    }

    /// Submit a decode task with its approximate memory cost. Runs on
    /// the worker pool once admitted; until then it waits in FIFO
    /// order.
    pub fn post_task(
        self: &Arc<Self>,
        cost: u64,
        task: impl FnOnce(DecodePermit) + Send + 'static,
    ) {
        let task: DecodeTask = Box::new(task);
        {
            let mut state = self.state.lock();
            if !state.admissible() {
                state.queue.push_back(QueuedTask { cost, task });
                return;
            }
            state.commit(cost);
        }
        self.dispatch(cost, task);
    }

    /// Return a task's cost to the budget and admit queued tasks that
    /// now fit. Called through [`DecodePermit`].
    pub fn finish_task(self: &Arc<Self>, cost: u64) {
        let admitted = {
            let mut state = self.state.lock();
            state.in_flight_memory = state.in_flight_memory.saturating_sub(cost);
            state.in_flight_count = state.in_flight_count.saturating_sub(1);
            state.drain_admissible()
        };
        // Dispatch outside the lock.
        for queued in admitted {
            self.dispatch(queued.cost, queued.task);
        }
    }

    /// Replace the budgets and admit queued tasks that fit the new
    /// ones. Running tasks are never canceled.
    pub fn update_capacity(self: &Arc<Self>, capacity: DeviceCapacity) {
        let admitted = {
            let mut state = self.state.lock();
            state.capacity = capacity;
            state.drain_admissible()
        };
        for queued in admitted {
            self.dispatch(queued.cost, queued.task);
        }
    }

    /// Committed in-flight memory and task count.
    pub fn in_flight(&self) -> (u64, u32) {
        let state = self.state.lock();
        (state.in_flight_memory, state.in_flight_count)
    }

    /// Number of tasks waiting for admission.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Current budgets.
    pub fn capacity(&self) -> DeviceCapacity {
        self.state.lock().capacity
    }

    fn dispatch(self: &Arc<Self>, cost: u64, task: DecodeTask) {
        let permit = DecodePermit {
            coordinator: Some(self.clone()),
            cost,
        };
        self.workers.post(move || task(permit));
    }
}

impl std::fmt::Debug for DecodeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DecodeCoordinator")
            .field("capacity", &state.capacity)
            .field("in_flight_memory", &state.in_flight_memory)
            .field("in_flight_count", &state.in_flight_count)
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Receipt for one admitted task's cost.
///
/// The pipeline carries the permit across runner hops and calls
/// [`finish`](Self::finish) exactly once at the task's terminal point.
/// If the task unwinds or forgets, the drop impl returns the cost so
/// the budget can never leak.
pub struct DecodePermit {
    coordinator: Option<Arc<DecodeCoordinator>>,
    cost: u64,
}

impl DecodePermit {
    /// Return the cost to the coordinator.
    pub fn finish(mut self) {
        self.release();
    }

    /// The cost this permit was admitted with.
    pub fn cost(&self) -> u64 {
        self.cost
    }

    fn release(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.finish_task(self.cost);
        }
    }
}

impl Drop for DecodePermit {
    fn drop(&mut self) {
        if self.coordinator.is_some() {
            warn!(cost = self.cost, "decode permit dropped without finish");
            self.release();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
