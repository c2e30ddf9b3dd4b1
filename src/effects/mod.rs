//! # Effects Module
//!
//! Local pixel transforms: best-match recoloring, chroma-key background
//! removal, and the processor that composes them for one frame.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chromatic_gif::color::Color;
//! use chromatic_gif::effects::{recolor, RecolorRule};
//! use chromatic_gif::frames::Frame;
//!
//! let frame = Frame::new_filled(10, 10, [255, 0, 0, 255], 100);
//! let rule = RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 0, 255));
//! let blue = recolor(&frame, &[rule]);
//! assert_eq!(blue.get_pixel(0, 0), [0, 0, 255, 255]);
//! ```

pub mod background;
pub mod local;
pub mod recolor;
pub mod settings;
pub mod traits;

pub use background::{remove_background, BackgroundRemovalEngine};
pub use local::LocalFrameProcessor;
pub use recolor::{recolor, RecolorEngine};
pub use settings::{EditMode, EditSettings, ModeSet, RecolorRule, RemovalSpec};
pub use traits::{CpuRenderContext, HeadlessRenderContext, PixelEffect, RenderContext};
