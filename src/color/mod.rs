//! # Color Module
//!
//! RGB color values, hex parsing, and the HSL conversions the recolor
//! engine is built on.

pub mod space;
pub mod types;

pub use space::{hsl_to_rgb, rgb_to_hsl};
pub use types::{Color, CHROMA_KEY};
