//! A boolean gate readable under a shared lock.
//!
//! Writers flip the switch rarely (for example when the app moves to
//! the background and GPU access is revoked); readers hold the guard
//! across the work that depends on the value, so a flip can never land
//! in the middle of that work.

use parking_lot::{RwLock, RwLockReadGuard};

/// Shared boolean with guarded reads.
#[derive(Debug, Default)]
pub struct SyncSwitch {
    value: RwLock<bool>,
}

impl SyncSwitch {
    pub fn new(initial: bool) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    /// Flip the switch. Blocks until no reader holds the value.
    pub fn set(&self, value: bool) {
        *self.value.write() = value;
    }

    /// Read the value under the lock; the returned guard keeps writers
    /// out until dropped.
    pub fn hold(&self) -> RwLockReadGuard<'_, bool> {
        self.value.read()
    }

    /// Momentary read without holding the guard.
    pub fn get(&self) -> bool {
        *self.value.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_false() {
        let switch = SyncSwitch::default();
        assert!(!switch.get());
    }

    #[test]
    fn set_and_get() {
        let switch = SyncSwitch::new(false);
        switch.set(true);
        assert!(switch.get());
    }

    #[test]
    fn hold_blocks_writers() {
        let switch = SyncSwitch::new(false);
        let guard = switch.hold();
        assert!(!*guard);
        // try_write must fail while a reader holds the guard.
        assert!(switch.value.try_write().is_none());
        drop(guard);
        assert!(switch.value.try_write().is_some());
    }
}
