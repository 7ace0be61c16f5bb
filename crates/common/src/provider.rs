//! The platform image provider contract consumed by the engine.
//!
//! A provider performs network fetch and platform-native decode. The
//! engine drives it through [`ImageProvider`]: asynchronous `request`
//! with best-effort `cancel`, synchronous `decode` callable from worker
//! threads, and a device-status hook that lets the platform throttle
//! concurrent decode memory when it sees pressure.

use crate::types::{Bitmap, PlatformImage, RequestId, RequestInfo};

/// Releases one platform image. Invoked at most once.
pub type ReleaseImageCallback = Box<dyn FnOnce(PlatformImage) + Send>;

/// Delivery callback for [`ImageProvider::request`]. May be invoked on
/// any thread, exactly once per non-canceled request.
pub type RequestCallback = Box<dyn FnOnce(PlatformImage, ReleaseImageCallback) + Send>;

/// Releases one decoded bitmap's pixels. Invoked at most once.
pub type ReleaseBitmapCallback = Box<dyn FnOnce(Bitmap) + Send>;

/// Result of decoding one frame: the bitmap (null pixels on failure)
/// and its release callback.
pub type DecodeResult = (Bitmap, ReleaseBitmapCallback);

/// Severity for provider-routed diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// External platform image provider.
///
/// Implementations must be callable from any engine thread.
pub trait ImageProvider: Send + Sync {
    /// Request an image. The platform image must be retained before
    /// being handed to `callback`, together with a release function;
    /// the engine decides when to invoke it.
    fn request(&self, id: RequestId, info: &RequestInfo, callback: RequestCallback);

    /// Best-effort cancel. The provider may still invoke the request
    /// callback afterwards; the engine handles that race.
    fn cancel(&self, id: RequestId);

    /// Decode one frame of a platform image to a bitmap. Synchronous;
    /// invoked on engine worker threads. Returns a bitmap with null
    /// pixels on failure.
    fn decode(&self, image: PlatformImage, frame_index: i32) -> DecodeResult;

    /// Whether the engine should re-query device capacity before the
    /// next request (for example after a low-memory notification).
    fn should_evaluate_device_status(&self) -> bool;

    /// Current device capacity: usable CPU core count and the memory
    /// budget for concurrently in-flight decodes, in bytes.
    fn evaluate_device_status(&self) -> (u32, u64);

    /// Diagnostic sink for the engine's per-request logs. The default
    /// forwards to `tracing`; platforms may redirect to their own
    /// logger.
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "pixport", "{message}"),
            LogLevel::Info => tracing::info!(target: "pixport", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "pixport", "{message}"),
            LogLevel::Error => tracing::error!(target: "pixport", "{message}"),
        }
    }
}
