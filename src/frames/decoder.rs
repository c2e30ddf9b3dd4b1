use std::io::Cursor;
use std::path::Path;

use gif::{ColorOutput, DecodeOptions, DisposalMethod};
use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::{debug, info};

use crate::config::DecodingConfig;
use crate::error::{FrameError, Result};
use crate::frames::types::Frame;

/// Decodes animated GIFs into full-canvas RGBA frames
///
/// Every GIF sub-image is composited onto a running canvas so each output
/// frame is a complete picture, honoring the per-frame disposal method.
pub struct GifDecoder {
    config: DecodingConfig,
}

impl GifDecoder {
    pub fn new(config: DecodingConfig) -> Self {
        Self { config }
    }

    /// Read and decode a GIF file from disk
    pub async fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Frame>> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        info!("Decoding {:?} ({} bytes)", path, bytes.len());
        self.decode(&bytes)
    }

    /// Decode GIF bytes into the frame sequence handed to the pipeline
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let composited = self.composite(bytes)?;
        let total = composited.len();

        let sampled = Self::downsample(composited, self.config.max_frames);
        let frames: Vec<Frame> = sampled
            .iter()
            .map(|frame| frame.limited_to_width(self.config.max_width))
            .collect();

        if let Some(first) = frames.first() {
            debug!(
                "Decoded {} frames (kept {}), canvas {}x{}",
                total,
                frames.len(),
                first.width(),
                first.height()
            );
        }

        Ok(frames)
    }

    fn composite(&self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let decode_failed = |e: gif::DecodingError| FrameError::DecodeFailed { reason: e.to_string() };

        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        let mut decoder = options.read_info(Cursor::new(bytes)).map_err(decode_failed)?;

        let canvas_width = decoder.width() as u32;
        let canvas_height = decoder.height() as u32;
        if canvas_width == 0 || canvas_height == 0 {
            return Err(FrameError::InvalidDimensions {
                details: format!("{}x{} canvas", canvas_width, canvas_height),
            }
            .into());
        }

        let mut canvas: RgbaImage = ImageBuffer::new(canvas_width, canvas_height);
        let mut frames = Vec::new();

        while let Some(gif_frame) = decoder.read_next_frame().map_err(decode_failed)? {
            let left = gif_frame.left as u32;
            let top = gif_frame.top as u32;
            let width = gif_frame.width as u32;
            let height = gif_frame.height as u32;

            let restore = match gif_frame.dispose {
                DisposalMethod::Previous => Some(canvas.clone()),
                _ => None,
            };

            for (i, px) in gif_frame.buffer.chunks_exact(4).enumerate() {
                if px[3] == 0 {
                    continue;
                }
                let x = left + (i as u32 % width);
                let y = top + (i as u32 / width);
                if x < canvas_width && y < canvas_height {
                    canvas.put_pixel(x, y, Rgba([px[0], px[1], px[2], px[3]]));
                }
            }

            let delay_ms = match gif_frame.delay as u32 * 10 {
                0 => self.config.default_delay_ms,
                ms => ms,
            };
            frames.push(Frame::new(canvas.clone(), delay_ms));

            match gif_frame.dispose {
                DisposalMethod::Background => {
                    for y in top..(top + height).min(canvas_height) {
                        for x in left..(left + width).min(canvas_width) {
                            canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                        }
                    }
                }
                DisposalMethod::Previous => {
                    if let Some(previous) = restore {
                        canvas = previous;
                    }
                }
                _ => {}
            }
        }

        if frames.is_empty() {
            return Err(FrameError::DecodeFailed {
                reason: "animation contains no frames".to_string(),
            }
            .into());
        }

        Ok(frames)
    }

    /// Keep every Nth frame when there are more than `max_frames`
    ///
    /// Kept delays are multiplied by the stride so the total playback time
    /// stays roughly the same.
    pub fn downsample(frames: Vec<Frame>, max_frames: usize) -> Vec<Frame> {
        if max_frames == 0 || frames.len() <= max_frames {
            return frames;
        }

        let stride = frames.len().div_ceil(max_frames);
        frames
            .iter()
            .step_by(stride)
            .map(|frame| frame.with_delay(frame.delay_ms() * stride as u32))
            .collect()
    }
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self::new(DecodingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gif::{Encoder, Repeat};

    /// Two-colour global palette GIF built from indexed sub-images
    fn build_gif(
        width: u16,
        height: u16,
        frames: &[(u16, u16, u16, u16, u8, DisposalMethod, u16)],
    ) -> Vec<u8> {
        let palette = [255, 0, 0, 0, 0, 255];
        let mut bytes = Vec::new();
        {
            let mut encoder = Encoder::new(&mut bytes, width, height, &palette).unwrap();
            encoder.set_repeat(Repeat::Infinite).unwrap();
            for &(left, top, w, h, index, dispose, delay) in frames {
                let mut frame = gif::Frame::default();
                frame.left = left;
                frame.top = top;
                frame.width = w;
                frame.height = h;
                frame.dispose = dispose;
                frame.delay = delay;
                frame.buffer = std::borrow::Cow::Owned(vec![index; w as usize * h as usize]);
                encoder.write_frame(&frame).unwrap();
            }
        }
        bytes
    }

    #[test]
    fn test_composites_onto_canvas() {
        let bytes = build_gif(
            4,
            4,
            &[
                (0, 0, 4, 4, 0, DisposalMethod::Keep, 5),
                (1, 1, 2, 2, 1, DisposalMethod::Keep, 0),
            ],
        );
        let frames = GifDecoder::default().decode(&bytes).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delay_ms(), 50);
        assert_eq!(frames[1].delay_ms(), 100);
        // Second frame keeps the red background under the blue patch
        assert_eq!(frames[1].get_pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frames[1].get_pixel(1, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn test_background_disposal_clears_region() {
        let bytes = build_gif(
            4,
            4,
            &[
                (0, 0, 2, 2, 0, DisposalMethod::Background, 10),
                (2, 2, 2, 2, 1, DisposalMethod::Keep, 10),
            ],
        );
        let frames = GifDecoder::default().decode(&bytes).unwrap();

        assert_eq!(frames[0].get_pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frames[1].get_pixel(0, 0)[3], 0);
        assert_eq!(frames[1].get_pixel(3, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn test_downsample_scales_delays() {
        let frames: Vec<Frame> = (0..120).map(|_| Frame::new_filled(1, 1, [0, 0, 0, 255], 40)).collect();
        let sampled = GifDecoder::downsample(frames, 50);

        // stride = ceil(120 / 50) = 3
        assert_eq!(sampled.len(), 40);
        assert!(sampled.iter().all(|f| f.delay_ms() == 120));
    }

    #[test]
    fn test_downsample_keeps_short_sequences() {
        let frames: Vec<Frame> = (0..50).map(|_| Frame::new_filled(1, 1, [0, 0, 0, 255], 40)).collect();
        assert_eq!(GifDecoder::downsample(frames, 50).len(), 50);
    }

    #[test]
    fn test_wide_frames_are_downscaled() {
        let bytes = build_gif(600, 10, &[(0, 0, 600, 10, 0, DisposalMethod::Keep, 10)]);
        let frames = GifDecoder::default().decode(&bytes).unwrap();
        assert_eq!((frames[0].width(), frames[0].height()), (300, 5));
    }

    #[test]
    fn test_garbage_input_fails() {
        let result = GifDecoder::default().decode(b"not a gif");
        assert!(matches!(
            result,
            Err(crate::error::EditorError::Frame(FrameError::DecodeFailed { .. }))
        ));
    }
}
