//! `px-runtime` — Task executors for the pixport image engine.
//!
//! The codec pipeline is threaded across three executors: a
//! single-threaded UI runner (codec state and result callbacks), a
//! single-threaded IO runner (GPU uploads), and a worker pool (decode).
//! This crate provides those executors plus the small synchronization
//! pieces the pipeline hops depend on:
//!
//! - [`TaskRunner`] / [`WorkerPool`] / [`TaskRunners`] — the executors
//! - [`RunnerRef`] — strong references whose final drop is marshaled to
//!   a designated runner
//! - [`SyncSwitch`] — guarded boolean gate (GPU availability)
//! - [`VmState`] — UI-runtime liveness for callback delivery

pub mod pool;
pub mod runner;
pub mod runner_ref;
pub mod runners;
pub mod sync_switch;
pub mod vm_state;

pub use pool::WorkerPool;
pub use runner::{Task, TaskRunner};
pub use runner_ref::RunnerRef;
pub use runners::TaskRunners;
pub use sync_switch::SyncSwitch;
pub use vm_state::{VmScope, VmState};
