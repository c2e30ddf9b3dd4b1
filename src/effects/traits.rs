use image::imageops::FilterType;
use image::RgbaImage;

use crate::frames::Frame;

/// A deterministic per-pixel transform
pub trait PixelEffect: Send + Sync {
    /// Returns the unique name of this effect
    fn name(&self) -> &str;

    /// Apply the effect to a working surface in place
    ///
    /// Callers hand in a surface they own; frames themselves are never touched.
    fn apply_to(&self, surface: &mut RgbaImage);

    /// Apply the effect to a copy of `frame`
    fn apply(&self, frame: &Frame) -> Frame {
        let mut surface = frame.as_image().clone();
        self.apply_to(&mut surface);
        frame.with_buffer(surface)
    }
}

/// Raster capability the local processor draws on
///
/// Implementations hand out working surfaces (owned pixel buffers with
/// get/set access) and resample them. Returning `None` means no surface can
/// be provided in this environment.
pub trait RenderContext: Send + Sync {
    fn name(&self) -> &str;

    /// An owned working copy of the frame's pixels
    fn surface_for(&self, frame: &Frame) -> Option<RgbaImage>;

    /// Resample a surface to the given size
    fn resize(&self, surface: &RgbaImage, width: u32, height: u32) -> Option<RgbaImage>;
}

/// In-memory CPU raster backend
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuRenderContext;

impl RenderContext for CpuRenderContext {
    fn name(&self) -> &str {
        "cpu"
    }

    fn surface_for(&self, frame: &Frame) -> Option<RgbaImage> {
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }
        Some(frame.as_image().clone())
    }

    fn resize(&self, surface: &RgbaImage, width: u32, height: u32) -> Option<RgbaImage> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(image::imageops::resize(surface, width, height, FilterType::Triangle))
    }
}

/// A context with no raster backend at all
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessRenderContext;

impl RenderContext for HeadlessRenderContext {
    fn name(&self) -> &str {
        "headless"
    }

    fn surface_for(&self, _frame: &Frame) -> Option<RgbaImage> {
        None
    }

    fn resize(&self, _surface: &RgbaImage, _width: u32, _height: u32) -> Option<RgbaImage> {
        None
    }
}
