//! Texture upload: bitmap pixels to a displayable image.
//!
//! The IO runner turns decoded bitmaps into either a cross-context GPU
//! texture (normal operation) or a CPU raster image (GPU disabled, for
//! example while the app is backgrounded). Either way the result is a
//! [`GpuImage`] the UI runtime can hand to the compositor, or `None`
//! when the upload fails; the caller reports failure as a null frame.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use px_common::{AlphaType, Bitmap, ColorType, PixelBuffer};
use px_runtime::SyncSwitch;

/// Pixel format metadata shared by bitmaps and uploaded images.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub width: i32,
    pub height: i32,
    pub color_type: ColorType,
    pub alpha_type: AlphaType,
}

impl ImageDescriptor {
    fn of(bitmap: &Bitmap) -> Self {
        Self {
            width: bitmap.width,
            height: bitmap.height,
            color_type: bitmap.color_type,
            alpha_type: bitmap.alpha_type,
        }
    }
}

/// Borrowed view of pixel data handed to the GPU uploader. Does not
/// need to outlive the upload call.
pub struct Pixmap<'a> {
    pub descriptor: ImageDescriptor,
    pub bytes_per_row: usize,
    pub pixels: &'a [u8],
}

/// The opaque GPU uploader supplied by the rendering subsystem.
pub trait ResourceContext: Send + Sync {
    /// Upload the pixmap as a cross-context texture. Returns the
    /// texture handle, or `None` on allocation failure.
    fn upload_pixmap(&self, pixmap: &Pixmap<'_>) -> Option<u64>;
}

/// GPU-backed texture bound to the async unref queue: dropping it
/// enqueues the handle for deferred destruction on the IO side instead
/// of destroying in place.
#[derive(Debug)]
pub struct GpuTexture {
    handle: u64,
    descriptor: ImageDescriptor,
    unref: Sender<u64>,
}

impl GpuTexture {
    pub fn handle(&self) -> u64 {
        self.handle
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        let _ = self.unref.send(self.handle);
    }
}

/// CPU-resident image owning its pixel buffer.
#[derive(Debug)]
pub struct RasterImage {
    pixels: PixelBuffer,
    bytes_per_row: usize,
    descriptor: ImageDescriptor,
}

impl RasterImage {
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_slice()
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }
}

/// A displayable image produced by the upload step.
#[derive(Debug)]
pub enum GpuImage {
    /// CPU fallback used while the GPU is unavailable.
    Raster(RasterImage),
    /// Cross-context GPU texture.
    Texture(GpuTexture),
}

impl GpuImage {
    pub fn descriptor(&self) -> ImageDescriptor {
        match self {
            Self::Raster(raster) => raster.descriptor,
            Self::Texture(texture) => texture.descriptor,
        }
    }

    pub fn width(&self) -> i32 {
        self.descriptor().width
    }

    pub fn height(&self) -> i32 {
        self.descriptor().height
    }
}

/// IO-side upload environment: the GPU-availability gate, the uploader
/// handed over by the rendering subsystem, and the async unref queue.
pub struct IoManager {
    gpu_disabled: SyncSwitch,
    context: RwLock<Option<Arc<dyn ResourceContext>>>,
    unref_tx: Sender<u64>,
    unref_rx: Receiver<u64>,
}

impl IoManager {
    pub fn new() -> Self {
        let (unref_tx, unref_rx) = channel::unbounded();
        Self {
            gpu_disabled: SyncSwitch::new(false),
            context: RwLock::new(None),
            unref_tx,
            unref_rx,
        }
    }

    /// Gate flipped by the embedder when GPU access goes away.
    pub fn gpu_disabled(&self) -> &SyncSwitch {
        &self.gpu_disabled
    }

    pub fn set_context(&self, context: Arc<dyn ResourceContext>) {
        *self.context.write() = Some(context);
    }

    pub fn clear_context(&self) {
        *self.context.write() = None;
    }

    pub fn context(&self) -> Option<Arc<dyn ResourceContext>> {
        self.context.read().clone()
    }

    /// Whether uploads can be attempted at all.
    pub fn is_valid(&self) -> bool {
        self.context.read().is_some()
    }

    /// Texture handles waiting for deferred destruction. The rendering
    /// subsystem drains this on its own schedule.
    pub fn drain_unref_queue(&self) -> Vec<u64> {
        self.unref_rx.try_iter().collect()
    }
}

impl Default for IoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoManager")
            .field("gpu_disabled", &self.gpu_disabled.get())
            .field("has_context", &self.is_valid())
            .finish()
    }
}

/// Turn a decoded bitmap into a displayable image.
///
/// With the GPU disabled this builds a CPU raster image: a copied
/// bitmap's buffer is taken over wholesale (the bitmap's pixel pointer
/// is cleared so its release callback will not free it), a non-copied
/// bitmap is duplicated. With the GPU enabled the pixels are uploaded
/// as a cross-context texture bound to the unref queue.
///
/// Returns `None` on allocation or upload failure.
///
/// For bitmaps with `pixels_copied == false` the caller must hold the
/// platform-image lock across this call, since the pixels alias the
/// platform image.
pub fn upload_texture(io: &IoManager, bitmap: &mut Bitmap) -> Option<GpuImage> {
    if !bitmap.has_pixels() {
        return None;
    }
    let descriptor = ImageDescriptor::of(bitmap);
    let bytes_per_row = bitmap.bytes_per_row;

    let disabled = io.gpu_disabled.hold();
    if *disabled {
        let pixels = if bitmap.pixels_copied {
            let len = bitmap.byte_len();
            let ptr = std::mem::replace(&mut bitmap.pixels, std::ptr::null_mut());
            // SAFETY: copied bitmaps are allocated through
            // PixelBuffer::into_raw per the provider contract, and the
            // pointer was just detached from the bitmap so the release
            // callback cannot free it again.
            unsafe { PixelBuffer::from_raw(ptr, len) }
        } else {
            // SAFETY: pixels are non-null (checked above) and span
            // byte_len() bytes; the platform-image lock held by the
            // caller keeps the backing store alive.
            PixelBuffer::copy_from(unsafe { bitmap.pixel_slice() })?
        };
        Some(GpuImage::Raster(RasterImage {
            pixels,
            bytes_per_row,
            descriptor,
        }))
    } else {
        let context = io.context()?;
        // SAFETY: as above; the view only lives for the upload call.
        let pixels = unsafe { bitmap.pixel_slice() };
        let pixmap = Pixmap {
            descriptor,
            bytes_per_row,
            pixels,
        };
        let handle = context.upload_pixmap(&pixmap)?;
        Some(GpuImage::Texture(GpuTexture {
            handle,
            descriptor,
            unref: io.unref_tx.clone(),
        }))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct CountingContext {
        next_handle: AtomicU64,
        fail: AtomicBool,
    }

    impl CountingContext {
        fn new() -> Self {
            Self {
                next_handle: AtomicU64::new(1),
                fail: AtomicBool::new(false),
            }
        }
    }

    impl ResourceContext for CountingContext {
        fn upload_pixmap(&self, _pixmap: &Pixmap<'_>) -> Option<u64> {
            if self.fail.load(Ordering::SeqCst) {
                None
            } else {
                Some(self.next_handle.fetch_add(1, Ordering::SeqCst))
            }
        }
    }

    fn copied_bitmap(width: i32, height: i32) -> Bitmap {
        let bytes_per_row = width as usize * 4;
        let len = bytes_per_row * height as usize;
        let buffer = PixelBuffer::from_vec((0..len).map(|i| i as u8).collect());
        Bitmap {
            pixels: buffer.into_raw(),
            pixels_copied: true,
            width,
            height,
            alpha_type: AlphaType::Premul,
            color_type: ColorType::Rgba8888,
            bytes_per_row,
            user_data: std::ptr::null_mut(),
        }
    }

    fn reclaim(bitmap: &mut Bitmap) {
        if bitmap.has_pixels() {
            let len = bitmap.byte_len();
            let ptr = std::mem::replace(&mut bitmap.pixels, std::ptr::null_mut());
            drop(unsafe { PixelBuffer::from_raw(ptr, len) });
        }
    }

    // ── GPU path ─────────────────────────────────────────────────

    #[test]
    fn uploads_texture_when_gpu_enabled() {
        let io = IoManager::new();
        io.set_context(Arc::new(CountingContext::new()));

        let mut bitmap = copied_bitmap(4, 2);
        let image = upload_texture(&io, &mut bitmap).expect("upload should succeed");
        match &image {
            GpuImage::Texture(texture) => assert_eq!(texture.handle(), 1),
            GpuImage::Raster(_) => panic!("expected a texture"),
        }
        assert_eq!(image.width(), 4);
        // The GPU path does not take ownership of the pixels.
        assert!(bitmap.has_pixels());
        reclaim(&mut bitmap);

        // Dropping the texture defers destruction to the unref queue.
        drop(image);
        assert_eq!(io.drain_unref_queue(), vec![1]);
    }

    #[test]
    fn missing_context_fails_upload() {
        let io = IoManager::new();
        let mut bitmap = copied_bitmap(2, 2);
        assert!(upload_texture(&io, &mut bitmap).is_none());
        reclaim(&mut bitmap);
    }

    #[test]
    fn context_failure_fails_upload() {
        let io = IoManager::new();
        let context = Arc::new(CountingContext::new());
        context.fail.store(true, Ordering::SeqCst);
        io.set_context(context);

        let mut bitmap = copied_bitmap(2, 2);
        assert!(upload_texture(&io, &mut bitmap).is_none());
        reclaim(&mut bitmap);
    }

    // ── Raster path ──────────────────────────────────────────────

    #[test]
    fn raster_path_takes_ownership_of_copied_pixels() {
        let io = IoManager::new();
        io.set_context(Arc::new(CountingContext::new()));
        io.gpu_disabled().set(true);

        let mut bitmap = copied_bitmap(2, 2);
        let expected: Vec<u8> = (0..16).map(|i| i as u8).collect();

        let image = upload_texture(&io, &mut bitmap).expect("raster build should succeed");
        // Ownership moved into the raster image.
        assert!(!bitmap.has_pixels());
        match image {
            GpuImage::Raster(raster) => {
                assert_eq!(raster.pixels(), expected.as_slice());
                assert_eq!(raster.bytes_per_row(), 8);
            }
            GpuImage::Texture(_) => panic!("expected a raster image"),
        }
    }

    #[test]
    fn raster_path_copies_borrowed_pixels() {
        let io = IoManager::new();
        io.gpu_disabled().set(true);

        let mut bitmap = copied_bitmap(2, 2);
        bitmap.pixels_copied = false;

        let image = upload_texture(&io, &mut bitmap).expect("raster build should succeed");
        // Borrowed pixels stay with the bitmap; the raster holds a copy.
        assert!(bitmap.has_pixels());
        match image {
            GpuImage::Raster(raster) => assert_eq!(raster.pixels().len(), 16),
            GpuImage::Texture(_) => panic!("expected a raster image"),
        }
        // The test allocated through PixelBuffer, so reclaim manually.
        bitmap.pixels_copied = true;
        reclaim(&mut bitmap);
    }

    #[test]
    fn null_pixels_fail_upload() {
        let io = IoManager::new();
        let mut bitmap = Bitmap::invalid();
        assert!(upload_texture(&io, &mut bitmap).is_none());
    }
}
