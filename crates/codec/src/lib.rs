//! `px-codec` — Host-assisted image codec core.
//!
//! Sits between a UI runtime that wants decoded, GPU-uploaded image
//! frames and an external platform provider that fetches and
//! natively decodes them. The pipeline for one request runs
//! fetch (provider, async) → decode (worker pool, admission
//! controlled) → upload (IO runner) → result callback (UI runner).
//!
//! # Module Overview
//!
//! - [`device`] — capacity budgets bounding concurrent decode work
//! - [`coordinator`] — admission-controlled scheduler over the worker
//!   pool; tasks carry a [`coordinator::DecodePermit`] that returns
//!   their cost exactly once
//! - [`registry`] — pins codecs across the async fetch gap and
//!   resolves the cancel/delivery race with a one-shot take
//! - [`codec`] — the per-request [`codec::FrameCodec`] state machine
//! - [`upload`] — bitmap to GPU texture (or CPU raster fallback)
//! - [`manager`] — wiring, device-status evaluation, process-global
//!   install
//!
//! # Usage
//!
//! ```ignore
//! use px_codec::{CodecManager, install_manager, global_manager};
//! use px_common::{CodecConfig, RequestInfo};
//!
//! let manager = CodecManager::new(platform_provider, CodecConfig::default())?;
//! manager.io_manager().set_context(gpu_uploader);
//! install_manager(manager);
//!
//! let codec = global_manager()
//!     .unwrap()
//!     .instantiate_codec(RequestInfo::new("https://example.com/a.png", 0, 0))?;
//! codec.get_next_frame(Box::new(|frame| {
//!     // invoked on the UI runner with Some(frame) or None
//! }));
//! ```

pub mod codec;
pub mod coordinator;
pub mod device;
pub mod manager;
pub mod registry;
pub mod upload;

// Re-export primary types.
pub use codec::{FrameCallback, FrameCodec, FrameInfo, InfoCallback};
pub use coordinator::{DecodeCoordinator, DecodePermit};
pub use device::DeviceCapacity;
pub use manager::{
    global_manager, install_manager, install_provider, installed_provider, instantiate_codec,
    CodecManager,
};
pub use registry::PendingCodecRegistry;
pub use upload::{GpuImage, GpuTexture, ImageDescriptor, IoManager, Pixmap, RasterImage, ResourceContext};
