//! Core data model: request descriptors, platform images, and bitmaps.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr;

use serde::{Deserialize, Serialize};

/// Identifier for one provider request. Allocated from a process-wide
/// monotonically increasing counter; wrap-around is not expected within
/// a session.
pub type RequestId = u32;

/// Repetition count meaning "loop forever".
pub const INFINITE_LOOP: i32 = -1;

/// Immutable description of a requested image.
///
/// `parameters` affect the pixel output and are part of the logical
/// identity of the request; `extra_info` is passed through to the
/// provider without affecting pixels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Request URL.
    pub url: String,
    /// Target width in logical points (0 = native).
    pub target_width: i32,
    /// Target height in logical points (0 = native).
    pub target_height: i32,
    /// Parameters affecting final pixel data.
    pub parameters: BTreeMap<String, String>,
    /// Extra info not affecting pixel data.
    pub extra_info: BTreeMap<String, String>,
}

impl RequestInfo {
    pub fn new(url: impl Into<String>, target_width: i32, target_height: i32) -> Self {
        Self {
            url: url.into(),
            target_width,
            target_height,
            parameters: BTreeMap::new(),
            extra_info: BTreeMap::new(),
        }
    }
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{})",
            self.url, self.target_width, self.target_height
        )
    }
}

/// Opaque native image delivered by the provider.
///
/// `handle` is a provider-private token (0 = none). The struct is a plain
/// value; the paired `ReleaseImageCallback` is what gives the handle its
/// lifetime. Width and height are in pixels.
#[derive(Copy, Clone, Debug)]
pub struct PlatformImage {
    /// Provider-private handle, 0 means "no image".
    pub handle: usize,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// Number of frames (>= 1; > 1 for animated formats).
    pub frame_count: i32,
    /// Animation repetition count ([`INFINITE_LOOP`] = forever).
    pub repetition_count: i32,
    /// Total animation duration in milliseconds.
    pub duration_ms: i32,
    /// Provider-private pointer, never dereferenced by the engine.
    pub user_data: *mut c_void,
}

impl Default for PlatformImage {
    fn default() -> Self {
        Self {
            handle: 0,
            width: 0,
            height: 0,
            frame_count: 1,
            repetition_count: INFINITE_LOOP,
            duration_ms: 0,
            user_data: ptr::null_mut(),
        }
    }
}

impl PlatformImage {
    /// Whether a live native image is attached.
    pub fn has_handle(&self) -> bool {
        self.handle != 0
    }

    /// Approximate memory cost of decoding this image (RGBA working set).
    pub fn decode_cost(&self) -> u64 {
        self.width.max(0) as u64 * self.height.max(0) as u64 * 4
    }

    /// Metadata as the fixed 5-element info list.
    pub fn info_list(&self) -> ImageInfoList {
        [
            self.width,
            self.height,
            self.frame_count,
            self.duration_ms,
            self.repetition_count,
        ]
    }
}

// SAFETY: the handle and user_data pointer are opaque tokens owned by the
// provider. The provider contract requires them to be usable from any
// thread until the paired release callback runs; the engine never
// dereferences user_data.
unsafe impl Send for PlatformImage {}

/// How alpha is encoded in a bitmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AlphaType {
    Opaque,
    Premul,
    Unpremul,
}

/// Pixel layout of a decoded bitmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColorType {
    Rgba8888,
    Bgra8888,
    Rgb565,
    Argb4444,
    Alpha8,
}

impl ColorType {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8888 | Self::Bgra8888 => 4,
            Self::Rgb565 | Self::Argb4444 => 2,
            Self::Alpha8 => 1,
        }
    }
}

/// Raw CPU pixel buffer produced by decoding a platform image.
///
/// If `pixels_copied` is true the buffer is independent of the platform
/// image and ownership may be transferred to the engine (see
/// [`crate::pixel::PixelBuffer`] for the allocation contract). If false,
/// the pixels are a view into the platform image and stay valid only
/// while that image is retained.
#[derive(Debug)]
pub struct Bitmap {
    /// Pixel data, null on decode failure.
    pub pixels: *mut u8,
    /// True if the pixel data has no dependence on the platform image.
    pub pixels_copied: bool,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    pub alpha_type: AlphaType,
    pub color_type: ColorType,
    /// Row stride in bytes.
    pub bytes_per_row: usize,
    /// Provider-private pointer, never dereferenced by the engine.
    pub user_data: *mut c_void,
}

impl Bitmap {
    /// An invalid bitmap signalling decode failure.
    pub fn invalid() -> Self {
        Self {
            pixels: ptr::null_mut(),
            pixels_copied: false,
            width: 0,
            height: 0,
            alpha_type: AlphaType::Opaque,
            color_type: ColorType::Rgba8888,
            bytes_per_row: 0,
            user_data: ptr::null_mut(),
        }
    }

    /// Whether decode produced pixel data.
    pub fn has_pixels(&self) -> bool {
        !self.pixels.is_null()
    }

    /// Total buffer length in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes_per_row * self.height.max(0) as usize
    }

    /// View the pixel data as a byte slice.
    ///
    /// # Safety
    ///
    /// `pixels` must be non-null and point to at least [`Self::byte_len`]
    /// readable bytes. For non-copied bitmaps the caller must hold
    /// whatever lock keeps the backing platform image alive.
    pub unsafe fn pixel_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.pixels, self.byte_len())
    }
}

// SAFETY: the pixel pointer is either an owned allocation (pixels_copied)
// or a view whose validity is governed by the platform image's release
// callback. Both are usable from any thread under the provider contract;
// user_data is an opaque token.
unsafe impl Send for Bitmap {}

/// Fixed 5-element image metadata list handed to the UI runtime:
/// `[width, height, frame_count, duration_ms, repetition_count]`.
pub type ImageInfoList = [i32; 5];

/// Info list for "no image" answers (zero size, single frame).
pub fn empty_info_list() -> ImageInfoList {
    [0, 0, 1, 0, INFINITE_LOOP]
}
