//! # Frames Module
//!
//! The frame type and the GIF container boundaries: decoding a file into
//! full-canvas RGBA frames and encoding edited frames back into a GIF.

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::GifDecoder;
pub use encoder::{AnimationEncoder, EncodedAnimation, GifEncoder};
pub use types::{Frame, DEFAULT_DELAY_MS};
