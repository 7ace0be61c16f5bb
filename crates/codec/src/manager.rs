//! Engine manager: owns the executors, the decode coordinator, the
//! pending-codec registry, and the provider, and instantiates codecs.
//!
//! A deployment creates one manager during bootstrap and installs it as
//! the process global. Tests build their own manager per scenario with
//! a mock provider and private runners.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use px_common::{
    CodecConfig, CodecError, ImageProvider, LogLevel, RequestId, RequestInfo,
};
use px_runtime::{TaskRunners, VmState};

use crate::codec::FrameCodec;
use crate::coordinator::DecodeCoordinator;
use crate::device::DeviceCapacity;
use crate::registry::PendingCodecRegistry;
use crate::upload::IoManager;

/// State shared between the manager and every codec it creates.
pub(crate) struct ManagerShared {
    pub(crate) provider: Arc<dyn ImageProvider>,
    pub(crate) runners: TaskRunners,
    pub(crate) io: Arc<IoManager>,
    pub(crate) vm: Arc<VmState>,
    pub(crate) coordinator: Arc<DecodeCoordinator>,
    pub(crate) registry: PendingCodecRegistry,
    next_request_id: AtomicU32,
    device_status_evaluated: AtomicBool,
}

impl ManagerShared {
    /// Allocate a fresh request id. Ids start at 1 so the "no request
    /// yet" value of 0 can never collide with a live entry.
    pub(crate) fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// The image engine's entry point for the UI runtime binding.
pub struct CodecManager {
    shared: Arc<ManagerShared>,
}

impl CodecManager {
    /// Build a manager with its own executors. The decode coordinator
    /// starts on the config's fallback budgets until the provider
    /// reports real device capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] if an executor thread fails to spawn
    /// (for example on thread-limit exhaustion).
    pub fn new(provider: Arc<dyn ImageProvider>, config: CodecConfig) -> Result<Self, CodecError> {
        let runners = TaskRunners::new(config.worker_threads as usize)?;
        let coordinator = DecodeCoordinator::new(
            runners.workers().clone(),
            DeviceCapacity::from_config(&config),
        );
        Ok(Self {
            shared: Arc::new(ManagerShared {
                provider,
                runners,
                io: Arc::new(IoManager::new()),
                vm: Arc::new(VmState::new()),
                coordinator,
                registry: PendingCodecRegistry::new(),
                next_request_id: AtomicU32::new(1),
                device_status_evaluated: AtomicBool::new(false),
            }),
        })
    }

    /// Create a codec for one image request.
    ///
    /// Re-evaluates device capacity first (decode peaks dominate RSS,
    /// and the provider is the authority on transient pressure), then
    /// validates the descriptor.
    pub fn instantiate_codec(
        &self,
        descriptor: RequestInfo,
    ) -> Result<Arc<FrameCodec>, CodecError> {
        self.evaluate_device_status();

        if descriptor.url.is_empty() {
            let error = CodecError::InvalidDescriptor {
                reason: "empty url".to_string(),
            };
            self.shared.provider.log(LogLevel::Error, &error.to_string());
            return Err(error);
        }

        Ok(FrameCodec::new(self.shared.clone(), descriptor))
    }

    /// Ask the provider whether capacity should be re-read and, if so
    /// (or if it was never read), republish the budgets to the decode
    /// coordinator. Running decodes are unaffected.
    pub fn evaluate_device_status(&self) {
        let shared = &self.shared;
        let should = !shared.device_status_evaluated.load(Ordering::SeqCst)
            || shared.provider.should_evaluate_device_status();
        if !should {
            return;
        }

        let (cpu, memory) = shared.provider.evaluate_device_status();
        shared.provider.log(
            LogLevel::Info,
            &format!("device capacity: {cpu} cores, {memory} bytes in flight"),
        );
        shared
            .coordinator
            .update_capacity(DeviceCapacity::new(cpu, memory));
        shared.device_status_evaluated.store(true, Ordering::SeqCst);
    }

    // ── Component access (binding layer and tests) ───────────────

    pub fn runners(&self) -> &TaskRunners {
        &self.shared.runners
    }

    pub fn io_manager(&self) -> &Arc<IoManager> {
        &self.shared.io
    }

    pub fn vm_state(&self) -> &Arc<VmState> {
        &self.shared.vm
    }

    pub fn coordinator(&self) -> &Arc<DecodeCoordinator> {
        &self.shared.coordinator
    }

    /// Number of requests currently pinned in the pending registry.
    pub fn pending_request_count(&self) -> usize {
        self.shared.registry.len()
    }
}

impl std::fmt::Debug for CodecManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecManager")
            .field("pending_requests", &self.pending_request_count())
            .field("coordinator", &self.shared.coordinator)
            .finish()
    }
}

// ── Process-global install ───────────────────────────────────────────

static GLOBAL_PROVIDER: OnceLock<Arc<dyn ImageProvider>> = OnceLock::new();
static GLOBAL_MANAGER: OnceLock<CodecManager> = OnceLock::new();

/// Install the process-wide provider. The first install wins; later
/// calls return false and change nothing.
pub fn install_provider(provider: Arc<dyn ImageProvider>) -> bool {
    GLOBAL_PROVIDER.set(provider).is_ok()
}

/// The installed provider, if any.
pub fn installed_provider() -> Option<Arc<dyn ImageProvider>> {
    GLOBAL_PROVIDER.get().cloned()
}

/// Install the process-wide manager. The first install wins; later
/// calls drop the argument and return false.
pub fn install_manager(manager: CodecManager) -> bool {
    GLOBAL_MANAGER.set(manager).is_ok()
}

/// The installed manager, if any.
pub fn global_manager() -> Option<&'static CodecManager> {
    GLOBAL_MANAGER.get()
}

/// Instantiate a codec through the installed manager.
pub fn instantiate_codec(descriptor: RequestInfo) -> Result<Arc<FrameCodec>, CodecError> {
    global_manager()
        .ok_or(CodecError::ManagerNotInstalled)?
        .instantiate_codec(descriptor)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use px_common::{Bitmap, DecodeResult, PlatformImage, RequestCallback};
    use std::sync::atomic::AtomicUsize;

    /// Provider stub: never delivers, counts calls.
    struct StubProvider {
        requests: AtomicUsize,
        evaluations: AtomicUsize,
        reevaluate: AtomicBool,
        device: (u32, u64),
    }

    impl StubProvider {
        fn new(device: (u32, u64)) -> Self {
            Self {
                requests: AtomicUsize::new(0),
                evaluations: AtomicUsize::new(0),
                reevaluate: AtomicBool::new(false),
                device,
            }
        }
    }

    impl ImageProvider for StubProvider {
        fn request(&self, _id: RequestId, _info: &RequestInfo, _callback: RequestCallback) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel(&self, _id: RequestId) {}

        fn decode(&self, _image: PlatformImage, _frame_index: i32) -> DecodeResult {
            (Bitmap::invalid(), Box::new(|_| {}))
        }

        fn should_evaluate_device_status(&self) -> bool {
            self.reevaluate.load(Ordering::SeqCst)
        }

        fn evaluate_device_status(&self) -> (u32, u64) {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            self.device
        }
    }

    fn manager_with(provider: Arc<StubProvider>) -> CodecManager {
        let config = CodecConfig {
            worker_threads: 1,
            ..Default::default()
        };
        CodecManager::new(provider, config).expect("manager should build")
    }

    #[test]
    fn rejects_empty_url() {
        let provider = Arc::new(StubProvider::new((2, 1024)));
        let manager = manager_with(provider);
        let result = manager.instantiate_codec(RequestInfo::new("", 0, 0));
        assert!(matches!(
            result,
            Err(CodecError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn first_instantiate_evaluates_device_status() {
        let provider = Arc::new(StubProvider::new((3, 4096)));
        let manager = manager_with(provider.clone());

        let _codec = manager
            .instantiate_codec(RequestInfo::new("https://example.com/a.png", 0, 0))
            .unwrap();
        assert_eq!(provider.evaluations.load(Ordering::SeqCst), 1);
        let capacity = manager.coordinator().capacity();
        assert_eq!(capacity.cpu_core_count, 3);
        assert_eq!(capacity.max_memory_in_flight, 4096);

        // No pressure signal: the second instantiate does not re-read.
        let _codec = manager
            .instantiate_codec(RequestInfo::new("https://example.com/b.png", 0, 0))
            .unwrap();
        assert_eq!(provider.evaluations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pressure_signal_forces_reevaluation() {
        let provider = Arc::new(StubProvider::new((2, 2048)));
        let manager = manager_with(provider.clone());
        manager.evaluate_device_status();
        assert_eq!(provider.evaluations.load(Ordering::SeqCst), 1);

        provider.reevaluate.store(true, Ordering::SeqCst);
        manager.evaluate_device_status();
        assert_eq!(provider.evaluations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_ids_are_monotonic_from_one() {
        let provider = Arc::new(StubProvider::new((2, 1024)));
        let manager = manager_with(provider);
        assert_eq!(manager.shared.next_request_id(), 1);
        assert_eq!(manager.shared.next_request_id(), 2);
        assert_eq!(manager.shared.next_request_id(), 3);
    }

    #[test]
    fn registry_take_is_at_most_once() {
        let provider = Arc::new(StubProvider::new((2, 1024)));
        let manager = manager_with(provider);
        let codec = manager
            .instantiate_codec(RequestInfo::new("https://example.com/c.png", 0, 0))
            .unwrap();

        manager.shared.registry.retain(9, &codec);
        assert_eq!(manager.pending_request_count(), 1);
        assert!(manager.shared.registry.take(9).is_some());
        assert!(manager.shared.registry.take(9).is_none());
        assert_eq!(manager.pending_request_count(), 0);
    }
}
