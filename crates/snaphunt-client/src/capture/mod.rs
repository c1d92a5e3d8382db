//! Camera access for one task's capture screen.
//!
//! A [`CaptureBackend`] opens a [`VideoSource`]; the [`CaptureDeviceManager`] owns the open
//! source, renders its frames into a fixed-size off-screen buffer and cuts snapshots from
//! that buffer. The source is stopped by [`CaptureDeviceManager::release`] and never
//! outlives the manager.

mod backends;
mod frame;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use backends::{StillImageBackend, TestPatternBackend};
pub use frame::{
    decode_base64_image, encode_png, letterbox, FrameSize, ImageBlob, DEFAULT_PREVIEW_SIZE,
};

/// Redraw period of the render loop, one frame per display refresh at 60 Hz.
pub const REFRESH_PERIOD: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("no frame rendered yet")]
    NoFrame,
    #[error("capture device already released")]
    Released,
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

/// Platform side of the camera: grants or refuses access and hands out a live source.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError>;

    fn describe(&self) -> String;
}

/// A live capture stream. `poll_frame` returns a frame when a new one is ready.
pub trait VideoSource: Send {
    fn poll_frame(&mut self) -> Option<RgbImage>;

    /// Stop every underlying track. Called exactly once.
    fn stop(&mut self);
}

/// An opened source waiting to be installed into a manager.
pub struct DeviceHandle {
    label: String,
    source: Box<dyn VideoSource>,
}

impl DeviceHandle {
    pub fn new(label: impl Into<String>, source: Box<dyn VideoSource>) -> Self {
        Self {
            label: label.into(),
            source,
        }
    }

    /// Stop a handle that will never be installed.
    pub fn discard(mut self) {
        tracing::debug!(device = %self.label, "discarding unused capture device");
        self.source.stop();
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Idle,
    Acquiring,
    /// Open, waiting for the first frame.
    Warming,
    Live,
    PermissionDenied,
    Unavailable(String),
    Released,
}

pub struct CaptureDeviceManager {
    preview: FrameSize,
    status: DeviceStatus,
    label: Option<String>,
    source: Option<Arc<Mutex<Box<dyn VideoSource>>>>,
    frame: Arc<Mutex<Option<RgbImage>>>,
    render: Option<CancellationToken>,
}

impl CaptureDeviceManager {
    pub fn new(preview: FrameSize) -> Self {
        Self {
            preview,
            status: DeviceStatus::Idle,
            label: None,
            source: None,
            frame: Arc::new(Mutex::new(None)),
            render: None,
        }
    }

    /// Ask the platform for a device. Suspends until access is granted or refused.
    pub async fn acquire(backend: &dyn CaptureBackend) -> Result<DeviceHandle, CaptureError> {
        let label = backend.describe();
        tracing::debug!(device = %label, "requesting capture device");
        let source = backend.open().await?;
        tracing::info!(device = %label, "capture device granted");
        Ok(DeviceHandle::new(label, source))
    }

    /// Mark an acquisition as in flight. Returns false if a device is already open or
    /// being opened, or the manager was released.
    pub fn begin_acquire(&mut self) -> bool {
        match self.status {
            DeviceStatus::Idle | DeviceStatus::PermissionDenied | DeviceStatus::Unavailable(_) => {
                self.status = DeviceStatus::Acquiring;
                true
            }
            _ => false,
        }
    }

    /// Take the outcome of [`CaptureDeviceManager::acquire`]. A granted handle starts the
    /// render loop; a refusal leaves the manager ready for another attempt.
    pub fn install(
        &mut self,
        result: Result<DeviceHandle, CaptureError>,
    ) -> Result<(), CaptureError> {
        let handle = match result {
            Ok(handle) => handle,
            Err(err) => {
                if self.status != DeviceStatus::Released {
                    self.status = match &err {
                        CaptureError::PermissionDenied => DeviceStatus::PermissionDenied,
                        other => DeviceStatus::Unavailable(other.to_string()),
                    };
                }
                tracing::warn!(error = %err, "capture device not available");
                return Err(err);
            }
        };

        if self.status != DeviceStatus::Acquiring {
            handle.discard();
            return Err(CaptureError::Released);
        }

        let source = Arc::new(Mutex::new(handle.source));
        let cancel = CancellationToken::new();
        spawn_render_loop(
            source.clone(),
            self.frame.clone(),
            self.preview,
            cancel.clone(),
        );
        self.label = Some(handle.label);
        self.source = Some(source);
        self.render = Some(cancel);
        self.status = DeviceStatus::Warming;
        Ok(())
    }

    pub fn status(&self) -> DeviceStatus {
        if self.status == DeviceStatus::Warming && self.frame.lock().is_some() {
            return DeviceStatus::Live;
        }
        self.status.clone()
    }

    pub fn is_acquired(&self) -> bool {
        self.source.is_some()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Copy of the most recently rendered frame.
    pub fn preview(&self) -> Option<RgbImage> {
        self.frame.lock().clone()
    }

    /// Encode the most recently rendered frame.
    pub fn capture_snapshot(&self) -> Result<ImageBlob, CaptureError> {
        if self.source.is_none() {
            return Err(match self.status {
                DeviceStatus::Released => CaptureError::Released,
                _ => CaptureError::NoFrame,
            });
        }
        let frame = self.frame.lock();
        let frame = frame.as_ref().ok_or(CaptureError::NoFrame)?;
        encode_png(frame).map_err(|e| CaptureError::Encode(e.to_string()))
    }

    /// Stop the render loop and every capture track. Later calls do nothing.
    pub fn release(&mut self) {
        if self.status == DeviceStatus::Released {
            return;
        }
        if let Some(cancel) = self.render.take() {
            cancel.cancel();
        }
        if let Some(source) = self.source.take() {
            source.lock().stop();
            tracing::info!(device = self.label.as_deref().unwrap_or("unknown"), "capture device released");
        }
        *self.frame.lock() = None;
        self.status = DeviceStatus::Released;
    }
}

impl fmt::Debug for CaptureDeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureDeviceManager")
            .field("preview", &self.preview)
            .field("status", &self.status)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Drop for CaptureDeviceManager {
    fn drop(&mut self) {
        if self.source.is_some() {
            tracing::warn!("capture device dropped without release");
            self.release();
        }
    }
}

fn spawn_render_loop(
    source: Arc<Mutex<Box<dyn VideoSource>>>,
    target: Arc<Mutex<Option<RgbImage>>>,
    preview: FrameSize,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut refresh = tokio::time::interval(REFRESH_PERIOD);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rendered = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = refresh.tick() => {
                    let next = source.lock().poll_frame();
                    if let Some(raw) = next {
                        let fitted = letterbox(&raw, preview);
                        *target.lock() = Some(fitted);
                        rendered += 1;
                        if rendered == 1 {
                            tracing::debug!("first capture frame rendered");
                        }
                    }
                }
            }
        }
        tracing::trace!(rendered, "render loop stopped");
    });
}
