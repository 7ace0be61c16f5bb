//! `px-common` — Shared types, provider contract, and errors for the
//! pixport image engine.
//!
//! This crate is the foundation the other engine crates depend on. It
//! defines the core abstractions:
//!
//! - **Types**: `RequestInfo`, `PlatformImage`, `Bitmap`, `ImageInfoList`
//! - **Pixels**: `PixelBuffer` (owned allocations with a raw handoff contract)
//! - **Provider**: `ImageProvider` (fetch, cancel, decode, device status)
//! - **Errors**: `CodecError` (thiserror-based)
//! - **Config**: `CodecConfig`

pub mod config;
pub mod error;
pub mod pixel;
pub mod provider;
pub mod types;

// Re-export commonly used items at crate root
pub use config::CodecConfig;
pub use error::{CodecError, CodecResult};
pub use pixel::PixelBuffer;
pub use provider::{
    DecodeResult, ImageProvider, LogLevel, ReleaseBitmapCallback, ReleaseImageCallback,
    RequestCallback,
};
pub use types::{
    empty_info_list, AlphaType, Bitmap, ColorType, ImageInfoList, PlatformImage, RequestId,
    RequestInfo, INFINITE_LOOP,
};
