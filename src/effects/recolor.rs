use image::RgbaImage;
use rayon::prelude::*;

use crate::color::{hsl_to_rgb, rgb_to_hsl, Color};
use crate::effects::settings::RecolorRule;
use crate::effects::traits::PixelEffect;
use crate::frames::Frame;

/// Maximum distance between a pixel and a rule's source for the rule to apply
pub const RECOLOR_THRESHOLD: f32 = 60.0;

/// Pixels with alpha below this are treated as transparent and skipped
pub const ALPHA_SKIP_THRESHOLD: u8 = 10;

/// Recolor `frame` with the default thresholds
pub fn recolor(frame: &Frame, rules: &[RecolorRule]) -> Frame {
    RecolorEngine::new(rules.to_vec()).apply(frame)
}

/// Rewrites pixels close to a rule's source color
///
/// The closest rule under the threshold wins. The target's hue and saturation
/// replace the pixel's, and the pixel keeps its own lightness so shading
/// survives the change.
pub struct RecolorEngine {
    rules: Vec<PreparedRule>,
    threshold: f32,
    alpha_skip: u8,
}

struct PreparedRule {
    source: [u8; 3],
    target_hue: f32,
    target_saturation: f32,
}

impl RecolorEngine {
    pub fn new(rules: Vec<RecolorRule>) -> Self {
        Self::with_thresholds(rules, RECOLOR_THRESHOLD, ALPHA_SKIP_THRESHOLD)
    }

    pub fn with_thresholds(rules: Vec<RecolorRule>, threshold: f32, alpha_skip: u8) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let (h, s, _) = rgb_to_hsl(rule.target.r, rule.target.g, rule.target.b);
                PreparedRule {
                    source: rule.source.to_rgb(),
                    target_hue: h,
                    target_saturation: s,
                }
            })
            .collect();

        Self {
            rules,
            threshold,
            alpha_skip,
        }
    }

    fn best_match(&self, rgb: [u8; 3]) -> Option<&PreparedRule> {
        let mut best: Option<(&PreparedRule, f32)> = None;

        for rule in &self.rules {
            let distance = Color::distance_rgb(rgb, rule.source);
            if distance >= self.threshold {
                continue;
            }
            // strict comparison keeps the earlier rule on ties
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((rule, distance));
            }
        }

        best.map(|(rule, _)| rule)
    }

    fn recolor_pixel(&self, px: &mut [u8]) {
        if px[3] < self.alpha_skip {
            return;
        }

        if let Some(rule) = self.best_match([px[0], px[1], px[2]]) {
            let (_, _, lightness) = rgb_to_hsl(px[0], px[1], px[2]);
            let (r, g, b) = hsl_to_rgb(rule.target_hue, rule.target_saturation, lightness);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    }
}

impl PixelEffect for RecolorEngine {
    fn name(&self) -> &str {
        "recolor"
    }

    fn apply_to(&self, surface: &mut RgbaImage) {
        if self.rules.is_empty() {
            return;
        }

        surface
            .par_chunks_exact_mut(4)
            .for_each(|px| self.recolor_pixel(px));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn red_to_blue() -> Vec<RecolorRule> {
        vec![RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 0, 255))]
    }

    #[test]
    fn test_solid_red_becomes_blue() {
        let frame = Frame::new_filled(10, 10, [255, 0, 0, 255], 100);
        let result = recolor(&frame, &red_to_blue());

        assert!(result.as_image().pixels().all(|p| p.0 == [0, 0, 255, 255]));
        // input untouched
        assert_eq!(frame.get_pixel(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_far_pixels_unchanged() {
        let mut image = Frame::new_filled(3, 1, [0, 0, 0, 255], 100).into_image();
        image.put_pixel(0, 0, Rgba([255, 60, 0, 255])); // distance exactly 60
        image.put_pixel(1, 0, Rgba([10, 200, 30, 255]));
        image.put_pixel(2, 0, Rgba([190, 0, 0, 128])); // distance 65
        let frame = Frame::new(image, 100);

        let result = recolor(&frame, &red_to_blue());
        assert_eq!(result, frame);
    }

    #[test]
    fn test_transparent_pixels_skipped() {
        let frame = Frame::new_filled(2, 2, [255, 0, 0, 9], 100);
        let result = recolor(&frame, &red_to_blue());
        assert_eq!(result.get_pixel(1, 1), [255, 0, 0, 9]);

        let frame = Frame::new_filled(2, 2, [255, 0, 0, 10], 100);
        let result = recolor(&frame, &red_to_blue());
        assert_eq!(result.get_pixel(1, 1), [0, 0, 255, 10]);
    }

    #[test]
    fn test_lightness_preserved() {
        // dark red: h=0 s=1 l~0.39
        let frame = Frame::new_filled(1, 1, [200, 0, 0, 255], 100);
        let rules = vec![RecolorRule::new(Color::new(220, 0, 0), Color::new(0, 255, 0))];
        let result = recolor(&frame, &rules);

        let px = result.get_pixel(0, 0);
        let (_, _, l_before) = rgb_to_hsl(200, 0, 0);
        let (h, s, l_after) = rgb_to_hsl(px[0], px[1], px[2]);
        assert!((l_before - l_after).abs() < 0.01);
        assert!((h - 1.0 / 3.0).abs() < 0.01);
        assert!((s - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_exact_source_match_takes_target_hue_and_saturation() {
        let source = Color::new(180, 90, 40);
        let target = Color::new(30, 120, 200);
        let frame = Frame::new_filled(1, 1, [180, 90, 40, 255], 100);
        let result = recolor(&frame, &[RecolorRule::new(source, target)]);

        let (th, ts, _) = rgb_to_hsl(target.r, target.g, target.b);
        let (_, _, sl) = rgb_to_hsl(source.r, source.g, source.b);
        let (er, eg, eb) = hsl_to_rgb(th, ts, sl);
        let px = result.get_pixel(0, 0);
        assert_eq!([px[0], px[1], px[2]], [er, eg, eb]);
    }

    #[test]
    fn test_best_match_not_first_match() {
        // pixel is 50 from the first source and 5 from the second
        let frame = Frame::new_filled(1, 1, [205, 0, 0, 255], 100);
        let rules = vec![
            RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 255, 0)),
            RecolorRule::new(Color::new(200, 0, 0), Color::new(0, 0, 255)),
        ];
        let result = recolor(&frame, &rules);
        let px = result.get_pixel(0, 0);
        assert!(px[2] > px[1], "expected blue-ish, got {:?}", px);
    }

    #[test]
    fn test_no_rules_is_identity() {
        let frame = Frame::new_filled(2, 2, [255, 0, 0, 255], 100);
        assert_eq!(recolor(&frame, &[]), frame);
    }
}
