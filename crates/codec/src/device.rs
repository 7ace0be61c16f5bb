//! Device capacity budgets for decode admission.

use px_common::CodecConfig;

/// Budgets bounding concurrent decode work: a soft parallelism cap and
/// a memory ceiling for in-flight decode working sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceCapacity {
    /// Usable CPU cores; caps the number of concurrently running
    /// decode tasks.
    pub cpu_core_count: u32,
    /// Memory ceiling in bytes. New tasks are held back once the
    /// committed in-flight memory reaches this value.
    pub max_memory_in_flight: u64,
}

impl DeviceCapacity {
    /// Build a capacity, clamping the core count to at least one so
    /// admission can always make progress.
    pub fn new(cpu_core_count: u32, max_memory_in_flight: u64) -> Self {
        Self {
            cpu_core_count: cpu_core_count.max(1),
            max_memory_in_flight,
        }
    }

    /// Fallback budgets used until the provider reports real ones.
    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(
            config.fallback_cpu_core_count,
            config.fallback_max_memory_in_flight,
        )
    }
}
