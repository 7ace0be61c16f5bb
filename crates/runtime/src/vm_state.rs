//! UI-runtime binding state.
//!
//! Result callbacks must only be invoked while the embedding UI runtime
//! is alive. `VmState` models that lifetime: flush paths acquire a
//! scope before invoking callbacks and skip delivery when the runtime
//! has shut down.

use parking_lot::{RwLock, RwLockReadGuard};

/// Liveness of the embedding UI runtime.
#[derive(Debug)]
pub struct VmState {
    alive: RwLock<bool>,
}

/// Proof that the runtime was alive when acquired; keeps shutdown out
/// until dropped.
pub struct VmScope<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

impl VmState {
    pub fn new() -> Self {
        Self {
            alive: RwLock::new(true),
        }
    }

    /// Acquire a scope for callback delivery. Returns `None` once the
    /// runtime has shut down.
    pub fn scope(&self) -> Option<VmScope<'_>> {
        let guard = self.alive.read();
        if *guard {
            Some(VmScope { _guard: guard })
        } else {
            None
        }
    }

    /// Mark the runtime as gone. Blocks until in-flight scopes drop.
    pub fn shutdown(&self) {
        *self.alive.write() = false;
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.read()
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}
