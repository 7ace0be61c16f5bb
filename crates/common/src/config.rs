//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Top-level codec engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Decode worker threads (0 = one per available core).
    pub worker_threads: u32,
    /// CPU budget used for decode admission until the provider reports
    /// device capacity.
    pub fallback_cpu_core_count: u32,
    /// Memory budget in bytes for concurrently in-flight decodes until
    /// the provider reports device capacity.
    pub fallback_max_memory_in_flight: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            fallback_cpu_core_count: 2,
            fallback_max_memory_in_flight: 64 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets() {
        let config = CodecConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.fallback_cpu_core_count, 2);
        assert_eq!(config.fallback_max_memory_in_flight, 64 * 1024 * 1024);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: CodecConfig = serde_json::from_str("{\"worker_threads\":4}").unwrap();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.fallback_cpu_core_count, 2);
    }
}
