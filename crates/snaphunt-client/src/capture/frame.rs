use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

/// Fixed output size of the preview buffer and of every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        DEFAULT_PREVIEW_SIZE
    }
}

pub const DEFAULT_PREVIEW_SIZE: FrameSize = FrameSize::new(200, 200);

/// Encoded still image. Lives on the client only until it has been sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Bytes,
}

impl ImageBlob {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Scale `source` so its longer side matches the target's corresponding side, keep the
/// aspect ratio, centre it on a black canvas and clip whatever overflows.
pub fn letterbox(source: &RgbImage, target: FrameSize) -> RgbImage {
    let mut canvas = RgbImage::new(target.width, target.height);
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 || target.width == 0 || target.height == 0 {
        return canvas;
    }

    let scale = if sw >= sh {
        target.width as f64 / sw as f64
    } else {
        target.height as f64 / sh as f64
    };
    let nw = ((sw as f64 * scale).round() as u32).max(1);
    let nh = ((sh as f64 * scale).round() as u32).max(1);

    let scaled = if (nw, nh) == (sw, sh) {
        source.clone()
    } else {
        imageops::resize(source, nw, nh, FilterType::Triangle)
    };
    let x = (target.width as i64 - nw as i64) / 2;
    let y = (target.height as i64 - nh as i64) / 2;
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

pub fn encode_png(frame: &RgbImage) -> Result<ImageBlob, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    frame.write_to(&mut buf, ImageFormat::Png)?;
    Ok(ImageBlob::from_bytes(Bytes::from(buf.into_inner())))
}

pub fn decode_base64_image(data: &str) -> Option<RgbImage> {
    let raw = STANDARD.decode(data.trim()).ok()?;
    image::load_from_memory(&raw).ok().map(|img| img.to_rgb8())
}
