use image::RgbaImage;
use rayon::prelude::*;

use crate::color::Color;
use crate::effects::settings::RemovalSpec;
use crate::effects::traits::PixelEffect;
use crate::frames::Frame;

/// Width of the soft edge past the tolerance in transparent mode
pub const FEATHER_BAND: f32 = 20.0;

/// Remove or replace the background of `frame` with the default feather band
pub fn remove_background(frame: &Frame, spec: &RemovalSpec) -> Frame {
    BackgroundRemovalEngine::new(spec.clone()).apply(frame)
}

/// Chroma-key background removal
///
/// Pixels within `tolerance` of the key become transparent, or take the
/// replacement color at full opacity when one is set. In transparent mode the
/// next `feather_band` units of distance fade alpha in linearly.
pub struct BackgroundRemovalEngine {
    spec: RemovalSpec,
    feather_band: f32,
}

impl BackgroundRemovalEngine {
    pub fn new(spec: RemovalSpec) -> Self {
        Self::with_feather(spec, FEATHER_BAND)
    }

    pub fn with_feather(spec: RemovalSpec, feather_band: f32) -> Self {
        Self { spec, feather_band }
    }

    fn process_pixel(&self, px: &mut [u8]) {
        if px[3] == 0 {
            return;
        }

        let distance = Color::distance_rgb([px[0], px[1], px[2]], self.spec.key_color.to_rgb());
        let tolerance = self.spec.tolerance;

        match self.spec.replacement {
            Some(fill) if distance < tolerance => {
                px[0] = fill.r;
                px[1] = fill.g;
                px[2] = fill.b;
                px[3] = 255;
            }
            None if distance < tolerance => {
                px[3] = 0;
            }
            None if distance < tolerance + self.feather_band => {
                let factor = (distance - tolerance) / self.feather_band;
                px[3] = (px[3] as f32 * factor).round().clamp(0.0, 255.0) as u8;
            }
            _ => {}
        }
    }
}

impl PixelEffect for BackgroundRemovalEngine {
    fn name(&self) -> &str {
        "remove-bg"
    }

    fn apply_to(&self, surface: &mut RgbaImage) {
        surface
            .par_chunks_exact_mut(4)
            .for_each(|px| self.process_pixel(px));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::CHROMA_KEY;

    fn single(px: [u8; 4]) -> Frame {
        Frame::new_filled(1, 1, px, 100)
    }

    #[test]
    fn test_key_color_becomes_transparent() {
        let result = remove_background(&single([0, 255, 0, 255]), &RemovalSpec::transparent(CHROMA_KEY));
        assert_eq!(result.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_feather_band_halves_alpha() {
        // distance 70 = tolerance + 10
        let result = remove_background(&single([0, 185, 0, 200]), &RemovalSpec::transparent(CHROMA_KEY));
        assert_eq!(result.get_pixel(0, 0), [0, 185, 0, 100]);
    }

    #[test]
    fn test_outside_band_unchanged() {
        // distance 80 = tolerance + 20
        let frame = single([0, 175, 0, 255]);
        let result = remove_background(&frame, &RemovalSpec::transparent(CHROMA_KEY));
        assert_eq!(result, frame);
    }

    #[test]
    fn test_solid_mode_fills_opaque() {
        let white = Color::new(255, 255, 255);
        let result = remove_background(&single([10, 240, 5, 40]), &RemovalSpec::solid(CHROMA_KEY, white));
        assert_eq!(result.get_pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_solid_mode_has_no_feather() {
        let white = Color::new(255, 255, 255);
        let frame = single([0, 185, 0, 200]);
        let result = remove_background(&frame, &RemovalSpec::solid(CHROMA_KEY, white));
        assert_eq!(result, frame);
    }

    #[test]
    fn test_fully_transparent_pixels_skipped() {
        let white = Color::new(255, 255, 255);
        let frame = single([0, 255, 0, 0]);
        let result = remove_background(&frame, &RemovalSpec::solid(CHROMA_KEY, white));
        assert_eq!(result, frame);
    }

    #[test]
    fn test_custom_tolerance() {
        let spec = RemovalSpec::transparent(CHROMA_KEY).with_tolerance(10.0);
        let result = remove_background(&single([0, 240, 0, 255]), &spec);
        // distance 15 sits in the feather band of a tolerance-10 key
        assert_eq!(result.get_pixel(0, 0)[3], 64);
    }
}
