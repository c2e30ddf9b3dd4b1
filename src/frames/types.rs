use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgba, RgbaImage};

use crate::error::{FrameError, Result};

/// Delay used when the source frame carries none
pub const DEFAULT_DELAY_MS: u32 = 100;

/// A single animation frame
///
/// RGBA pixels plus the time the frame stays on screen. Processing stages
/// never mutate a frame; they build a new one with [`Frame::with_buffer`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbaImage,
    delay_ms: u32,
}

impl Frame {
    /// Create a frame; a zero delay falls back to [`DEFAULT_DELAY_MS`]
    pub fn new(buffer: RgbaImage, delay_ms: u32) -> Self {
        let delay_ms = if delay_ms == 0 { DEFAULT_DELAY_MS } else { delay_ms };
        Self { buffer, delay_ms }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 4], delay_ms: u32) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgba(color));
        Self::new(buffer, delay_ms)
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Get a pixel at the given coordinates (returns RGBA array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }

    /// A new frame with the same delay and different pixels
    pub fn with_buffer(&self, buffer: RgbaImage) -> Self {
        Self {
            buffer,
            delay_ms: self.delay_ms,
        }
    }

    /// A copy of this frame with its delay replaced
    pub fn with_delay(&self, delay_ms: u32) -> Self {
        Self::new(self.buffer.clone(), delay_ms)
    }

    /// Convert the frame to raw RGBA bytes
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.buffer.as_raw().clone()
    }

    /// PNG-encode the pixels
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(self.buffer.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(|e| FrameError::InvalidDimensions {
                details: format!("PNG encoding failed: {}", e),
            })?;
        Ok(bytes)
    }

    /// Resample to exactly `width` x `height` with a single smoothing pass
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        let buffer = image::imageops::resize(&self.buffer, width, height, FilterType::Triangle);
        self.with_buffer(buffer)
    }

    /// Proportionally downscale frames wider than `max_width`
    ///
    /// Frames at or under the limit are returned unchanged.
    pub fn limited_to_width(&self, max_width: u32) -> Self {
        if self.width() <= max_width || max_width == 0 {
            return self.clone();
        }
        let scale = max_width as f64 / self.width() as f64;
        let height = ((self.height() as f64 * scale).round() as u32).max(1);
        self.resized(max_width, height)
    }
}
