use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use rand::Rng;

use super::{CaptureBackend, CaptureError, VideoSource};

/// Serves a photo from disk as a camera that always shows the same picture.
#[derive(Debug, Clone)]
pub struct StillImageBackend {
    path: PathBuf,
}

impl StillImageBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureBackend for StillImageBackend {
    async fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            _ => CaptureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e)),
        })?;
        let frame = image::load_from_memory(&raw)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e)))?
            .to_rgb8();
        Ok(Box::new(StillImageSource {
            frame: Some(frame),
            stopped: false,
        }))
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}

struct StillImageSource {
    frame: Option<RgbImage>,
    stopped: bool,
}

impl VideoSource for StillImageSource {
    fn poll_frame(&mut self) -> Option<RgbImage> {
        if self.stopped {
            return None;
        }
        // the picture never changes, so it is delivered once
        self.frame.take()
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.frame = None;
    }
}

/// Synthetic camera producing a moving colour gradient with a little sensor noise.
#[derive(Debug, Clone, Copy)]
pub struct TestPatternBackend {
    width: u32,
    height: u32,
}

impl TestPatternBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new(320, 240)
    }
}

#[async_trait]
impl CaptureBackend for TestPatternBackend {
    async fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::DeviceUnavailable("empty test pattern".into()));
        }
        Ok(Box::new(TestPatternSource {
            width: self.width,
            height: self.height,
            frame_no: 0,
            stopped: false,
        }))
    }

    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }
}

struct TestPatternSource {
    width: u32,
    height: u32,
    frame_no: u32,
    stopped: bool,
}

impl VideoSource for TestPatternSource {
    fn poll_frame(&mut self) -> Option<RgbImage> {
        if self.stopped {
            return None;
        }
        self.frame_no = self.frame_no.wrapping_add(1);
        let shift = self.frame_no % 256;
        let mut rng = rand::thread_rng();
        let (w, h) = (self.width, self.height);
        Some(RgbImage::from_fn(w, h, |x, y| {
            let noise: u8 = rng.gen_range(0..12);
            let r = (((x + shift) % w) * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = (((x + y + shift * 2) % 256) as u8) / 2;
            Rgb([r.saturating_add(noise), g.saturating_add(noise), b.saturating_add(noise)])
        }))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_photo_is_unavailable() {
        let backend = StillImageBackend::new("/definitely/not/here.png");
        match backend.open().await {
            Err(CaptureError::DeviceUnavailable(reason)) => assert!(reason.contains("here.png")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_still_image_serves_photo_once() {
        let path = std::env::temp_dir().join(format!("snaphunt-still-{}.png", std::process::id()));
        RgbImage::from_pixel(10, 20, Rgb([1, 2, 3])).save(&path).unwrap();

        let mut source = StillImageBackend::new(&path).open().await.unwrap();
        let frame = source.poll_frame().unwrap();
        assert_eq!(frame.dimensions(), (10, 20));
        assert!(source.poll_frame().is_none());
        source.stop();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_pattern_moves_until_stopped() {
        let mut source = TestPatternBackend::new(16, 8).open().await.unwrap();
        let a = source.poll_frame().unwrap();
        let b = source.poll_frame().unwrap();
        assert_eq!(a.dimensions(), (16, 8));
        assert_ne!(a, b);
        source.stop();
        assert!(source.poll_frame().is_none());
    }
}
