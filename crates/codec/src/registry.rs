//! Pending codec registry.
//!
//! While a provider request is in flight the codec must stay alive even
//! if the UI drops its handle, and the delivery callback must find out
//! atomically whether it still owns the result. The registry is that
//! one-shot slot: `retain` pins the codec under its request id, `take`
//! removes and returns it. Exactly one of `take`-by-delivery or
//! `take`-by-cancel wins; the loser sees an empty slot and cleans up
//! its own side.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use px_common::RequestId;

use crate::codec::FrameCodec;

/// Map from in-flight request id to a pinned codec reference.
#[derive(Default)]
pub struct PendingCodecRegistry {
    map: Mutex<HashMap<RequestId, Arc<FrameCodec>>>,
}

impl PendingCodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `codec` under `id` until a matching [`take`](Self::take).
    pub fn retain(&self, id: RequestId, codec: &Arc<FrameCodec>) {
        self.map.lock().insert(id, codec.clone());
    }

    /// Remove and return the codec pinned under `id`, if any observer
    /// has not already taken it.
    pub fn take(&self, id: RequestId) -> Option<Arc<FrameCodec>> {
        self.map.lock().remove(&id)
    }

    /// Number of requests currently pinned.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl std::fmt::Debug for PendingCodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCodecRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
