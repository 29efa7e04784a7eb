//! Media frame access
//!
//! The pipeline treats codecs as an external concern: a `FrameSource` turns a
//! stored content object into RGB frames sampled at a requested rate. The
//! bundled `RawFrameSource` understands an uncompressed frame container and
//! backs the in-memory deployment and tests.

use crate::error::AppError;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;

/// A single decoded frame, 8-bit RGB, row-major
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AppError> {
        let expected = frame_byte_len(width, height)?;
        if data.len() != expected {
            return Err(AppError::Validation(format!(
                "frame buffer has {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single color; test and synthetic-content helper
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 3);
        for _ in 0..(width as usize) * (height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Iterate pixels as (r, g, b)
    pub fn pixels(&self) -> impl Iterator<Item = (u8, u8, u8)> + '_ {
        self.data.chunks_exact(3).map(|p| (p[0], p[1], p[2]))
    }

    /// Luma (grayscale) value of the pixel at (x, y), Rec. 601 weights
    pub fn luma(&self, x: u32, y: u32) -> f64 {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 3;
        let r = self.data[idx] as f64;
        let g = self.data[idx + 1] as f64;
        let b = self.data[idx + 2] as f64;
        0.299 * r + 0.587 * g + 0.114 * b
    }
}

/// Byte length of one `width * height` RGB frame, rejecting dimensions whose
/// product overflows. Header fields come off the wire unchecked.
fn frame_byte_len(width: u32, height: u32) -> Result<usize, AppError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "frame dimensions {}x{} are out of range",
                width, height
            ))
        })
}

/// Convert an RGB pixel to HSV: hue in degrees [0, 360), s and v in [0, 1]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

/// Decodes stored content into frames sampled at a given rate
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Sample frames at approximately `sample_fps` frames per content-second
    async fn sample(&self, content_key: &str, sample_fps: f64) -> Result<Vec<Frame>, AppError>;
}

/// Container header for the uncompressed frame format:
/// `[width: u32 LE][height: u32 LE][native_fps: u32 LE][frame_count: u32 LE]`
/// followed by `frame_count` raw RGB frames.
const RAW_HEADER_LEN: usize = 16;

/// Frame source for the uncompressed container stored in the object store
pub struct RawFrameSource {
    objects: Arc<dyn ObjectStore>,
}

impl RawFrameSource {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Encode frames into the raw container (ingestion/test helper)
    pub fn encode(frames: &[Frame], native_fps: u32) -> Result<Vec<u8>, AppError> {
        let first = frames
            .first()
            .ok_or_else(|| AppError::Validation("cannot encode zero frames".to_string()))?;
        let mut out = Vec::with_capacity(RAW_HEADER_LEN + frames.len() * first.data.len());
        out.extend_from_slice(&first.width.to_le_bytes());
        out.extend_from_slice(&first.height.to_le_bytes());
        out.extend_from_slice(&native_fps.to_le_bytes());
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        for frame in frames {
            if frame.width != first.width || frame.height != first.height {
                return Err(AppError::Validation(
                    "all frames in a container must share dimensions".to_string(),
                ));
            }
            out.extend_from_slice(&frame.data);
        }
        Ok(out)
    }
}

#[async_trait]
impl FrameSource for RawFrameSource {
    async fn sample(&self, content_key: &str, sample_fps: f64) -> Result<Vec<Frame>, AppError> {
        let bytes = self.objects.get(content_key).await?;
        if bytes.len() < RAW_HEADER_LEN {
            return Err(AppError::Validation(format!(
                "content '{}' is not a raw frame container",
                content_key
            )));
        }

        let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let height = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let native_fps = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let frame_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

        let frame_len = frame_byte_len(width, height)?;
        let payload_len = frame_count.checked_mul(frame_len).ok_or_else(|| {
            AppError::Validation(format!(
                "content '{}' declares an out-of-range frame count",
                content_key
            ))
        })?;
        if bytes.len() - RAW_HEADER_LEN < payload_len {
            return Err(AppError::Validation(format!(
                "content '{}' is truncated",
                content_key
            )));
        }

        // Take every Nth frame, matching a capture interval of
        // native_fps / sample_fps source frames.
        let interval = ((native_fps.max(1) as f64 / sample_fps).round() as usize).max(1);

        let mut sampled = Vec::new();
        for index in (0..frame_count).step_by(interval) {
            let start = RAW_HEADER_LEN + index * frame_len;
            let frame = Frame::new(width, height, bytes[start..start + frame_len].to_vec())?;
            sampled.push(frame);
        }
        Ok(sampled)
    }
}
