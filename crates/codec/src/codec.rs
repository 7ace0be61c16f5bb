//! Per-request codec state machine.
//!
//! A [`FrameCodec`] drives one requested image through fetch, decode,
//! and upload, hopping across the UI runner (state transitions and
//! result callbacks), the worker pool (admitted decodes), and the IO
//! runner (GPU uploads). Cancellation can arrive from the UI runner at
//! any point and is consulted at every stage boundary; the platform
//! image is released exactly once no matter which side of a race wins.
//!
//! Single-frame images cache their decoded frame after the first
//! pipeline pass. Animated images never cache: every `get_next_frame`
//! re-decodes the frame at the animation cursor, and the UI runtime
//! paces the animation by asking again when it wants the next frame.

use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use px_common::{
    empty_info_list, Bitmap, CodecError, ImageInfoList, LogLevel, PlatformImage,
    ReleaseBitmapCallback, ReleaseImageCallback, RequestCallback, RequestId, RequestInfo,
};
use px_runtime::RunnerRef;

use crate::coordinator::DecodePermit;
use crate::manager::ManagerShared;
use crate::upload::{self, GpuImage};

/// A decoded, uploaded frame handed to the UI runtime: the displayable
/// image plus this frame's display duration (0 for still images).
#[derive(Debug)]
pub struct FrameInfo {
    pub image: GpuImage,
    pub duration_ms: i32,
}

/// Result callback for [`FrameCodec::get_next_frame`]. Invoked on the
/// UI runner with the frame, or `None` on failure.
pub type FrameCallback = Box<dyn FnOnce(Option<Arc<FrameInfo>>) + Send>;

/// Result callback for [`FrameCodec::get_image_info`]. Invoked on the
/// UI runner with the 5-element metadata list.
pub type InfoCallback = Box<dyn FnOnce(ImageInfoList) + Send>;

/// A codec reference whose final drop lands on the UI runner.
type CodecRef = RunnerRef<FrameCodec>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Status {
    New,
    Downloading,
    Complete,
}

/// State owned by the UI runner. Behind a plain mutex so pipeline
/// closures can flush it, but only UI-runner tasks mutate it.
struct UiState {
    status: Status,
    requesting_image_info: bool,
    frame_callbacks: Vec<FrameCallback>,
    info_callbacks: Vec<InfoCallback>,
    cached_frame: Option<Arc<FrameInfo>>,
    next_frame_index: i32,
}

/// The platform-image slot. Guarded by a reentrant lock because the
/// provider's synchronous decode runs under it and may re-enter the
/// codec.
struct ImageSlot {
    image: PlatformImage,
    release: Option<ReleaseImageCallback>,
    assigned: bool,
}

/// Per-request state machine; see the module docs.
pub struct FrameCodec {
    pub(crate) shared: Arc<ManagerShared>,
    descriptor: RequestInfo,
    canceled: AtomicBool,
    /// Id of the in-flight frame request (0 = none yet).
    request_id: AtomicU32,
    ui_state: Mutex<UiState>,
    slot: ReentrantMutex<RefCell<ImageSlot>>,
    /// Snapshot of the last-assigned image metadata, readable without
    /// waiting on a decode that holds the slot lock. The handle field
    /// tracks releases; the rest survives them so metadata queries keep
    /// answering after the native image is gone.
    meta: Mutex<PlatformImage>,
}

impl FrameCodec {
    pub(crate) fn new(shared: Arc<ManagerShared>, descriptor: RequestInfo) -> Arc<Self> {
        Arc::new(Self {
            shared,
            descriptor,
            canceled: AtomicBool::new(false),
            request_id: AtomicU32::new(0),
            ui_state: Mutex::new(UiState {
                status: Status::New,
                requesting_image_info: false,
                frame_callbacks: Vec::new(),
                info_callbacks: Vec::new(),
                cached_frame: None,
                next_frame_index: 0,
            }),
            slot: ReentrantMutex::new(RefCell::new(ImageSlot {
                image: PlatformImage::default(),
                release: None,
                assigned: false,
            })),
            meta: Mutex::new(PlatformImage::default()),
        })
    }

    /// The immutable request descriptor this codec was built from.
    pub fn descriptor(&self) -> &RequestInfo {
        &self.descriptor
    }

    /// Frame count of the assigned platform image (1 before assignment).
    pub fn frame_count(&self) -> i32 {
        self.platform_image().frame_count
    }

    /// Repetition count of the assigned platform image (infinite before
    /// assignment).
    pub fn repetition_count(&self) -> i32 {
        self.platform_image().repetition_count
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    // ── UI-runner operations ─────────────────────────────────────

    /// Request the next frame. Must be called on the UI runner.
    ///
    /// Callers arriving while a pipeline pass is already in flight
    /// attach to it instead of starting another; all attached callbacks
    /// fire on the UI runner, in order, with the same result.
    pub fn get_next_frame(self: &Arc<Self>, callback: FrameCallback) {
        debug_assert!(
            self.shared.runners.ui().is_current(),
            "get_next_frame must run on the ui runner"
        );

        if self.is_canceled() {
            callback(None);
            return;
        }

        {
            let mut ui = self.ui_state.lock();
            if ui.status == Status::Complete {
                let image = self.platform_image();
                if image.frame_count > 1 {
                    if !image.has_handle() {
                        // The animation was torn down after a failure.
                        drop(ui);
                        self.log_error(&self.missing_image_error());
                        callback(None);
                        return;
                    }
                    drop(ui);
                    self.get_next_multiframe(Some(callback));
                    return;
                }
                if let Some(frame) = ui.cached_frame.clone() {
                    drop(ui);
                    callback(Some(frame));
                    return;
                }
                // Neither a cached frame nor an animation handle.
                // Believed unreachable; restart the download.
                debug_assert!(false, "complete codec without a frame");
                ui.status = Status::New;
            }

            ui.frame_callbacks.push(callback);
            if ui.status == Status::Downloading {
                return;
            }
            ui.status = Status::Downloading;
        }

        let request_id = self.shared.next_request_id();
        self.request_id.store(request_id, Ordering::SeqCst);
        // The registry keeps the codec alive across the async gap even
        // if the UI drops its handle before delivery.
        self.shared.registry.retain(request_id, self);
        self.shared
            .provider
            .request(request_id, &self.descriptor, self.fetch_callback(request_id));
    }

    /// Request only the image metadata. Must be called on the UI
    /// runner. The native image is released as soon as the metadata is
    /// recorded; nothing is retained for later decodes.
    pub fn get_image_info(self: &Arc<Self>, callback: InfoCallback) {
        debug_assert!(
            self.shared.runners.ui().is_current(),
            "get_image_info must run on the ui runner"
        );

        if self.is_canceled() {
            callback(empty_info_list());
            return;
        }

        let assigned_list = {
            let slot = self.slot.lock();
            let slot = slot.borrow();
            slot.assigned.then(|| slot.image.info_list())
        };
        if let Some(list) = assigned_list {
            callback(list);
            return;
        }

        {
            let mut ui = self.ui_state.lock();
            ui.info_callbacks.push(callback);
            if ui.requesting_image_info {
                return;
            }
            ui.requesting_image_info = true;
        }

        let request_id = self.shared.next_request_id();
        self.shared.registry.retain(request_id, self);
        let shared = self.shared.clone();
        let delivery: RequestCallback = Box::new(move |image, release| {
            FrameCodec::on_info_complete(&shared, request_id, image, release);
        });
        self.shared
            .provider
            .request(request_id, &self.descriptor, delivery);
    }

    /// Cancel the request. Idempotent; a cancel after completion is a
    /// no-op beyond clearing state. Pending callbacks are dropped
    /// without being invoked.
    pub fn cancel(&self) {
        let request_id = self.request_id.load(Ordering::SeqCst);
        // Drop any still-pending retain so a late delivery finds the
        // registry empty and disposes of its own image.
        let _ = self.shared.registry.take(request_id);

        self.canceled.store(true, Ordering::SeqCst);

        let downloading = self.ui_state.lock().status == Status::Downloading;
        if downloading {
            self.shared.provider.cancel(request_id);
        }

        self.release_platform_image();

        let mut ui = self.ui_state.lock();
        ui.cached_frame = None;
        ui.status = Status::Complete;
        ui.frame_callbacks.clear();
        ui.info_callbacks.clear();
    }

    // ── Fetch completion (any thread) ────────────────────────────

    fn fetch_callback(self: &Arc<Self>, request_id: RequestId) -> RequestCallback {
        let shared = self.shared.clone();
        Box::new(move |image, release| {
            FrameCodec::on_fetch_complete(&shared, request_id, image, release);
        })
    }

    fn on_fetch_complete(
        shared: &Arc<ManagerShared>,
        request_id: RequestId,
        image: PlatformImage,
        release: ReleaseImageCallback,
    ) {
        let Some(codec) = shared.registry.take(request_id) else {
            // Canceled before delivery: the image is ours to dispose of,
            // on this thread, before returning to the provider.
            release(image);
            return;
        };
        let codec = RunnerRef::new(codec, shared.runners.ui().clone());

        if !image.has_handle() {
            codec.log_error(&codec.fetch_error());
            if codec.is_canceled() {
                return; // reference drop routes to the ui runner
            }
            let ui = shared.runners.ui().clone();
            ui.post(move || Self::flush_failure_on_ui(codec));
            return;
        }

        let mut release = Some(release);
        {
            let _slot = codec.slot.lock();
            if !codec.is_canceled() {
                codec.assign_platform_image(image, release.take().expect("release taken once"));
            }
        }
        if let Some(release) = release {
            // Canceled while the image was in flight.
            release(image);
            return;
        }

        if image.frame_count > 1 {
            shared.provider.log(
                LogLevel::Info,
                &format!(
                    "request {request_id} is animated ({} frames)",
                    image.frame_count
                ),
            );
            // Kick the first frame from the UI runner so the animation
            // cursor only ever moves there.
            let ui = shared.runners.ui().clone();
            ui.post(move || {
                let codec = codec.into_inner();
                codec.get_next_multiframe(None);
            });
            return;
        }

        let cost = image.decode_cost();
        shared.coordinator.post_task(cost, move |permit| {
            FrameCodec::run_decode(codec, permit, 0, false);
        });
    }

    fn on_info_complete(
        shared: &Arc<ManagerShared>,
        request_id: RequestId,
        image: PlatformImage,
        release: ReleaseImageCallback,
    ) {
        let Some(codec) = shared.registry.take(request_id) else {
            release(image);
            return;
        };
        let codec = RunnerRef::new(codec, shared.runners.ui().clone());
        let ui = shared.runners.ui().clone();
        ui.post(move || {
            let codec = codec.into_inner();
            if !image.has_handle() {
                codec.log_error(&CodecError::Fetch {
                    request_id,
                    url: codec.descriptor.url.clone(),
                });
            }

            'flush: {
                if codec.is_canceled() {
                    break 'flush;
                }
                let mut ui_state = codec.ui_state.lock();
                if ui_state.info_callbacks.is_empty() {
                    break 'flush;
                }
                let Some(_scope) = codec.shared.vm.scope() else {
                    codec.log_plain("ui runtime gone, dropping info callbacks");
                    break 'flush;
                };
                let callbacks = mem::take(&mut ui_state.info_callbacks);
                drop(ui_state);
                let list = image.info_list();
                for callback in callbacks {
                    callback(list);
                }
            }

            // The info path retains nothing: record the metadata, then
            // release the native image immediately.
            codec.assign_platform_image(image, release);
            codec.release_platform_image();
            let mut ui_state = codec.ui_state.lock();
            ui_state.info_callbacks.clear();
            ui_state.requesting_image_info = false;
        });
    }

    // ── Decode (worker pool) and upload (IO runner) ──────────────

    /// Decode one frame on a worker thread. `multiframe` selects the
    /// animated flavor: frame-indexed decode, no eager image release,
    /// no caching.
    fn run_decode(codec: CodecRef, permit: DecodePermit, frame_index: i32, multiframe: bool) {
        let decode_result = {
            let slot = codec.slot.lock();
            let image = {
                let slot = slot.borrow();
                if codec.is_canceled() {
                    None
                } else if slot.image.has_handle() {
                    Some(slot.image)
                } else {
                    codec.log_error(&codec.missing_image_error());
                    None
                }
            };
            // Decode synchronously while still holding the slot lock:
            // a concurrent cancel cannot release the platform image out
            // from under the decoder.
            image.map(|image| codec.shared.provider.decode(image, frame_index))
        };

        let Some((bitmap, release_bitmap)) = decode_result else {
            permit.finish();
            return; // reference drop routes to the ui runner
        };

        if !bitmap.has_pixels() {
            codec.log_error(&codec.decode_error());
            permit.finish();
            codec.release_platform_image();
            let ui = codec.shared.runners.ui().clone();
            ui.post(move || Self::flush_failure_on_ui(codec));
            return;
        }

        if !multiframe && bitmap.pixels_copied {
            // Copied pixels no longer depend on the platform image;
            // release it before upload to cut the memory peak.
            codec.release_platform_image();
        }

        let io = codec.shared.runners.io().clone();
        io.post(move || Self::run_upload(codec, bitmap, release_bitmap, permit, multiframe));
    }

    /// Upload on the IO runner, then post completion to the UI runner.
    fn run_upload(
        codec: CodecRef,
        mut bitmap: Bitmap,
        release_bitmap: ReleaseBitmapCallback,
        permit: DecodePermit,
        multiframe: bool,
    ) {
        let pixels_copied = bitmap.pixels_copied;
        let mut uploaded: Option<GpuImage> = None;

        if multiframe {
            if codec.is_canceled() {
                release_bitmap(bitmap);
                permit.finish();
                return;
            }
            if codec.shared.io.is_valid() {
                uploaded = upload::upload_texture(&codec.shared.io, &mut bitmap);
            }
            release_bitmap(bitmap);
            permit.finish();
        } else {
            let mut quit = false;
            {
                // Non-copied pixels alias the platform image; holding
                // the slot lock keeps it alive until the upload is done.
                let _slot = codec.slot.lock();
                if codec.is_canceled() {
                    quit = true;
                } else if codec.shared.io.is_valid() {
                    uploaded = upload::upload_texture(&codec.shared.io, &mut bitmap);
                }
            }
            release_bitmap(bitmap);
            permit.finish();
            if quit {
                return;
            }
            if !pixels_copied {
                // The pixels are now on the GPU (or lost); the native
                // image is no longer needed.
                codec.release_platform_image();
            }
        }

        let ui = codec.shared.runners.ui().clone();
        ui.post(move || Self::complete_on_ui(codec, uploaded, multiframe));
    }

    /// Terminal state transition and callback flush on the UI runner.
    fn complete_on_ui(codec: CodecRef, uploaded: Option<GpuImage>, multiframe: bool) {
        let codec = codec.into_inner();
        if codec.is_canceled() {
            return;
        }

        let mut ui = codec.ui_state.lock();
        ui.status = Status::Complete;
        if ui.frame_callbacks.is_empty() {
            return;
        }
        let Some(_scope) = codec.shared.vm.scope() else {
            codec.log_plain("ui runtime gone, dropping frame callbacks");
            ui.frame_callbacks.clear();
            return;
        };

        let frame = if multiframe {
            match uploaded {
                Some(image) => {
                    let meta = codec.platform_image();
                    let duration = meta.duration_ms / meta.frame_count.max(1);
                    Some(Arc::new(FrameInfo {
                        image,
                        duration_ms: duration,
                    }))
                }
                None => {
                    // A failed upload ends the animation; later calls
                    // observe the missing handle and fail.
                    codec.release_platform_image();
                    codec.log_error(&codec.upload_error());
                    None
                }
            }
        } else {
            match uploaded {
                Some(image) => {
                    let frame = Arc::new(FrameInfo {
                        image,
                        duration_ms: 0,
                    });
                    ui.cached_frame = Some(frame.clone());
                    Some(frame)
                }
                None => {
                    codec.log_error(&codec.upload_error());
                    None
                }
            }
        };

        let callbacks = mem::take(&mut ui.frame_callbacks);
        drop(ui);
        for callback in callbacks {
            callback(frame.clone());
        }
    }

    /// Flush queued frame callbacks with `None` after a fetch or decode
    /// failure. Runs on the UI runner.
    fn flush_failure_on_ui(codec: CodecRef) {
        let codec = codec.into_inner();
        let mut ui = codec.ui_state.lock();
        ui.status = Status::Complete;
        if ui.frame_callbacks.is_empty() {
            return;
        }
        let Some(_scope) = codec.shared.vm.scope() else {
            codec.log_plain("ui runtime gone, dropping frame callbacks");
            ui.frame_callbacks.clear();
            return;
        };
        let callbacks = mem::take(&mut ui.frame_callbacks);
        drop(ui);
        for callback in callbacks {
            callback(None);
        }
    }

    // ── Animation ────────────────────────────────────────────────

    /// Decode the frame at the animation cursor and advance it. Runs on
    /// the UI runner; `callback` is `None` for the kick-off pass right
    /// after fetch (the original caller is already queued).
    fn get_next_multiframe(self: &Arc<Self>, callback: Option<FrameCallback>) {
        if self.is_canceled() {
            return;
        }
        if let Some(callback) = callback {
            self.ui_state.lock().frame_callbacks.push(callback);
        }

        let image = self.platform_image();
        let frame_index = {
            let mut ui = self.ui_state.lock();
            let index = ui.next_frame_index;
            ui.next_frame_index = (index + 1) % image.frame_count.max(1);
            index
        };

        let codec = self.pipeline_ref();
        self.shared
            .coordinator
            .post_task(image.decode_cost(), move |permit| {
                FrameCodec::run_decode(codec, permit, frame_index, true);
            });
    }

    // ── Platform image slot ──────────────────────────────────────

    /// Metadata snapshot of the assigned image. Cheap; does not wait on
    /// the slot lock (a decode may hold it for a long time).
    fn platform_image(&self) -> PlatformImage {
        *self.meta.lock()
    }

    fn assign_platform_image(&self, image: PlatformImage, release: ReleaseImageCallback) {
        let slot = self.slot.lock();
        {
            let mut slot = slot.borrow_mut();
            slot.image = image;
            slot.release = Some(release);
            slot.assigned = true;
        }
        *self.meta.lock() = image;
    }

    /// Invoke the release callback if a live handle is present, then
    /// clear the handle. Safe to call any number of times from any
    /// thread; the image metadata survives for later queries.
    pub(crate) fn release_platform_image(&self) {
        let slot = self.slot.lock();
        let (image, release) = {
            let mut slot = slot.borrow_mut();
            let image = slot.image;
            let release = slot.release.take();
            slot.image.handle = 0;
            (image, release)
        };
        self.meta.lock().handle = 0;
        if image.has_handle() {
            if let Some(release) = release {
                release(image);
            }
        }
    }

    fn pipeline_ref(self: &Arc<Self>) -> CodecRef {
        RunnerRef::new(self.clone(), self.shared.runners.ui().clone())
    }

    // ── Diagnostics ──────────────────────────────────────────────

    fn log_error(&self, error: &CodecError) {
        self.shared.provider.log(LogLevel::Error, &error.to_string());
    }

    fn log_plain(&self, message: &str) {
        self.shared.provider.log(
            LogLevel::Error,
            &format!(
                "{message} (request {}, url {})",
                self.request_id.load(Ordering::SeqCst),
                self.descriptor.url
            ),
        );
    }

    fn fetch_error(&self) -> CodecError {
        CodecError::Fetch {
            request_id: self.request_id.load(Ordering::SeqCst),
            url: self.descriptor.url.clone(),
        }
    }

    fn missing_image_error(&self) -> CodecError {
        CodecError::MissingImage {
            request_id: self.request_id.load(Ordering::SeqCst),
            url: self.descriptor.url.clone(),
        }
    }

    fn decode_error(&self) -> CodecError {
        CodecError::Decode {
            request_id: self.request_id.load(Ordering::SeqCst),
            url: self.descriptor.url.clone(),
        }
    }

    fn upload_error(&self) -> CodecError {
        CodecError::Upload {
            request_id: self.request_id.load(Ordering::SeqCst),
            url: self.descriptor.url.clone(),
        }
    }
}

impl Drop for FrameCodec {
    fn drop(&mut self) {
        // Covers codecs dropped without an explicit cancel: releases
        // the platform image and tells the provider to stop an
        // in-flight request.
        self.cancel();
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("url", &self.descriptor.url)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
