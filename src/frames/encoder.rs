use gif::{DisposalMethod, Encoder, Repeat};
use tracing::{debug, info};

use crate::color::Color;
use crate::config::EncodingConfig;
use crate::error::{EncodingError, Result};
use crate::frames::types::Frame;

/// Alpha below this is written as the GIF transparent index
const ALPHA_CUTOFF: u8 = 128;

/// An encoded animation ready to be written out
#[derive(Debug, Clone)]
pub struct EncodedAnimation {
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub transparent_key: Option<Color>,
}

impl EncodedAnimation {
    pub fn file_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Encoder boundary: ordered frames in, one encoded blob out
pub trait AnimationEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// Encode `frames` in order using their own delays
    ///
    /// When `transparent_key` is given, pixels exactly equal to it are
    /// written as transparent.
    fn encode(&self, frames: &[Frame], transparent_key: Option<Color>) -> Result<EncodedAnimation>;
}

/// GIF89a encoder using NeuQuant palette quantization
pub struct GifEncoder {
    config: EncodingConfig,
}

impl GifEncoder {
    pub fn new(config: EncodingConfig) -> Self {
        Self { config }
    }

    /// Prepare raw RGBA for `gif::Frame::from_rgba_speed`
    ///
    /// All transparent pixels share one colour so a single palette index
    /// can represent them.
    fn prepare_pixels(frame: &Frame, transparent_key: Option<Color>) -> (Vec<u8>, bool) {
        let mut pixels = frame.to_rgba_bytes();
        let mut has_transparency = false;

        for px in pixels.chunks_exact_mut(4) {
            let keyed = transparent_key
                .map(|key| px[0] == key.r && px[1] == key.g && px[2] == key.b)
                .unwrap_or(false);

            if keyed || px[3] < ALPHA_CUTOFF {
                px.copy_from_slice(&[0, 0, 0, 0]);
                has_transparency = true;
            }
        }

        (pixels, has_transparency)
    }
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self::new(EncodingConfig::default())
    }
}

impl AnimationEncoder for GifEncoder {
    fn name(&self) -> &str {
        "gif"
    }

    fn encode(&self, frames: &[Frame], transparent_key: Option<Color>) -> Result<EncodedAnimation> {
        let first = frames.first().ok_or(EncodingError::EmptySequence)?;
        let encode_failed = |e: gif::EncodingError| EncodingError::EncodeFailed { reason: e.to_string() };

        let width = u16::try_from(first.width()).map_err(|_| EncodingError::EncodeFailed {
            reason: format!("width {} exceeds GIF limits", first.width()),
        })?;
        let height = u16::try_from(first.height()).map_err(|_| EncodingError::EncodeFailed {
            reason: format!("height {} exceeds GIF limits", first.height()),
        })?;

        let speed = self.config.quality.clamp(1, 30) as i32;
        let mut bytes = Vec::new();

        {
            let mut encoder = Encoder::new(&mut bytes, width, height, &[]).map_err(encode_failed)?;
            if self.config.repeat_forever {
                encoder.set_repeat(Repeat::Infinite).map_err(encode_failed)?;
            }

            for (index, frame) in frames.iter().enumerate() {
                if frame.width() != first.width() || frame.height() != first.height() {
                    return Err(EncodingError::EncodeFailed {
                        reason: format!(
                            "frame {} is {}x{}, expected {}x{}",
                            index,
                            frame.width(),
                            frame.height(),
                            width,
                            height
                        ),
                    }
                    .into());
                }

                let (mut pixels, has_transparency) = Self::prepare_pixels(frame, transparent_key);
                let mut gif_frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, speed);
                gif_frame.delay = (frame.delay_ms() / 10).min(u16::MAX as u32) as u16;
                if has_transparency {
                    gif_frame.dispose = DisposalMethod::Background;
                }

                encoder.write_frame(&gif_frame).map_err(encode_failed)?;
                debug!("Encoded frame {} ({}ms)", index, frame.delay_ms());
            }
        }

        info!(
            "Encoded {} frames into {} bytes (transparent key: {})",
            frames.len(),
            bytes.len(),
            transparent_key.map(|c| c.to_hex()).unwrap_or_else(|| "none".to_string())
        );

        Ok(EncodedAnimation {
            bytes,
            frame_count: frames.len(),
            transparent_key,
        })
    }
}
