use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use crate::config::ProcessingConfig;
use crate::effects::background::{BackgroundRemovalEngine, FEATHER_BAND};
use crate::effects::recolor::{RecolorEngine, ALPHA_SKIP_THRESHOLD, RECOLOR_THRESHOLD};
use crate::effects::settings::{EditMode, EditSettings};
use crate::effects::traits::{CpuRenderContext, PixelEffect, RenderContext};
use crate::error::{FrameError, Result};
use crate::frames::Frame;

/// Deterministic local editing path
///
/// Recolors first, then removes the background, working on a surface
/// obtained from the render context. Never performs I/O.
pub struct LocalFrameProcessor {
    context: Arc<dyn RenderContext>,
    recolor_threshold: f32,
    alpha_skip: u8,
    feather_band: f32,
}

impl LocalFrameProcessor {
    pub fn new(context: Arc<dyn RenderContext>) -> Self {
        Self {
            context,
            recolor_threshold: RECOLOR_THRESHOLD,
            alpha_skip: ALPHA_SKIP_THRESHOLD,
            feather_band: FEATHER_BAND,
        }
    }

    pub fn from_config(config: &ProcessingConfig, context: Arc<dyn RenderContext>) -> Self {
        Self {
            context,
            recolor_threshold: config.recolor_threshold,
            alpha_skip: config.alpha_skip_threshold,
            feather_band: config.feather_band,
        }
    }

    /// Apply every active mode to a copy of `frame`
    pub fn process(&self, frame: &Frame, settings: &EditSettings) -> Result<Frame> {
        let mut surface = self
            .context
            .surface_for(frame)
            .ok_or(FrameError::RenderContextUnavailable {
                width: frame.width(),
                height: frame.height(),
            })?;
        let mut applied = Vec::new();

        if settings.is_active(EditMode::Recolor) && !settings.rules.is_empty() {
            let engine = RecolorEngine::with_thresholds(
                settings.rules.clone(),
                self.recolor_threshold,
                self.alpha_skip,
            );
            engine.apply_to(&mut surface);
            applied.push(engine.name().to_string());
        }

        if settings.is_active(EditMode::RemoveBackground) {
            let engine = BackgroundRemovalEngine::with_feather(settings.removal.clone(), self.feather_band);
            engine.apply_to(&mut surface);
            applied.push(engine.name().to_string());
        }

        debug!(
            "Processed {}x{} frame locally on {} ({})",
            frame.width(),
            frame.height(),
            self.context.name(),
            applied.join(", ")
        );
        Ok(frame.with_buffer(surface))
    }

    /// Remove the background of a frame, without recoloring
    pub fn remove_background(&self, frame: &Frame, settings: &EditSettings) -> Result<Frame> {
        let background_only = EditSettings {
            modes: std::iter::once(EditMode::RemoveBackground).collect(),
            ..settings.clone()
        };
        self.process(frame, &background_only)
    }

    /// Resample an externally produced image to the given size
    pub fn conform(&self, image: RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
        if image.dimensions() == (width, height) {
            return Ok(image);
        }
        self.context
            .resize(&image, width, height)
            .ok_or_else(|| FrameError::RenderContextUnavailable { width, height }.into())
    }
}

impl Default for LocalFrameProcessor {
    fn default() -> Self {
        Self::new(Arc::new(CpuRenderContext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Color, CHROMA_KEY};
    use crate::effects::settings::{ModeSet, RecolorRule, RemovalSpec};
    use crate::effects::traits::HeadlessRenderContext;
    use crate::error::EditorError;

    #[test]
    fn test_recolor_then_remove() {
        // Red pixels recolored to green, then keyed out as background
        let settings = EditSettings {
            modes: ModeSet::new().with(EditMode::Recolor).with(EditMode::RemoveBackground),
            rules: vec![RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 255, 0))],
            removal: RemovalSpec::transparent(CHROMA_KEY),
            prompt: None,
        };
        let frame = Frame::new_filled(3, 3, [255, 0, 0, 255], 100);
        let result = LocalFrameProcessor::default().process(&frame, &settings).unwrap();

        assert!(result.as_image().pixels().all(|p| p[3] == 0));
        assert_eq!(frame.get_pixel(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_inactive_modes_are_skipped() {
        let settings = EditSettings {
            modes: ModeSet::new().with(EditMode::RemoveBackground),
            rules: vec![RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 0, 255))],
            removal: RemovalSpec::transparent(CHROMA_KEY),
            prompt: None,
        };
        let frame = Frame::new_filled(2, 2, [255, 0, 0, 255], 100);
        let result = LocalFrameProcessor::default().process(&frame, &settings).unwrap();
        assert_eq!(result, frame);
    }

    #[test]
    fn test_headless_context_fails_fast() {
        let processor = LocalFrameProcessor::new(Arc::new(HeadlessRenderContext));
        let settings = EditSettings::remove_background(RemovalSpec::default());
        let frame = Frame::new_filled(2, 2, [0, 255, 0, 255], 100);

        let result = processor.process(&frame, &settings);
        assert!(matches!(
            result,
            Err(EditorError::Frame(FrameError::RenderContextUnavailable { width: 2, height: 2 }))
        ));
    }

    #[test]
    fn test_conform_resamples() {
        let processor = LocalFrameProcessor::default();
        let image = Frame::new_filled(8, 8, [1, 2, 3, 255], 100).into_image();
        let conformed = processor.conform(image, 4, 2).unwrap();
        assert_eq!(conformed.dimensions(), (4, 2));
    }

    #[test]
    fn test_preserves_delay() {
        let settings = EditSettings::remove_background(RemovalSpec::default());
        let frame = Frame::new_filled(2, 2, [0, 255, 0, 255], 340);
        let result = LocalFrameProcessor::default().process(&frame, &settings).unwrap();
        assert_eq!(result.delay_ms(), 340);
    }
}
