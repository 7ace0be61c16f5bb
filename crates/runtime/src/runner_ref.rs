//! Strong references whose final drop is marshaled to a home runner.
//!
//! Pipeline closures hop between worker, IO, and UI threads while
//! holding a shared object whose destructor is only safe on one of
//! them. `RunnerRef` pins the object through those hops and, when the
//! reference goes out of scope on a foreign thread, posts the drop to
//! the home runner instead of running it in place.

use std::ops::Deref;
use std::sync::Arc;

use crate::runner::TaskRunner;

/// A strong reference bound to a home runner.
///
/// Dropping a `RunnerRef` on any other thread re-posts the contained
/// `Arc` to the home runner, so the value's destructor (if this was the
/// last reference) executes there.
pub struct RunnerRef<T: Send + Sync + 'static> {
    value: Option<Arc<T>>,
    home: TaskRunner,
}

impl<T: Send + Sync + 'static> RunnerRef<T> {
    pub fn new(value: Arc<T>, home: TaskRunner) -> Self {
        Self {
            value: Some(value),
            home,
        }
    }

    /// The home runner this reference is bound to.
    pub fn home(&self) -> &TaskRunner {
        &self.home
    }

    /// Unwrap the reference for plain use on the home runner.
    pub fn into_inner(mut self) -> Arc<T> {
        debug_assert!(
            self.home.is_current(),
            "RunnerRef unwrapped off its home runner"
        );
        self.value.take().expect("value already taken")
    }
}

impl<T: Send + Sync + 'static> Deref for RunnerRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("value already taken")
    }
}

impl<T: Send + Sync + 'static> Drop for RunnerRef<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if self.home.is_current() {
                drop(value);
            } else {
                self.home.post(move || drop(value));
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
