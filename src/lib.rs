//! # Chromatic-GIF
//!
//! Recolor objects and remove backgrounds in animated GIFs.
//!
//! Every frame of an animation is edited independently, either by a remote AI
//! image edit service or by deterministic local pixel transforms, and the
//! edited frames are re-encoded as a new GIF. Remote failures fall back to the
//! local path per frame, and a quota error switches the rest of the run to
//! local processing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chromatic_gif::{
//!     color::Color,
//!     config::Config,
//!     effects::{EditSettings, LocalFrameProcessor, RecolorRule},
//!     frames::{GifDecoder, GifEncoder},
//!     pipeline::{CancellationFlag, FrameJobScheduler, RunOutcome},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let frames = GifDecoder::new(config.decoding.clone()).decode_file("car.gif").await?;
//!
//! let scheduler = FrameJobScheduler::new(
//!     config.processing.clone(),
//!     Arc::new(LocalFrameProcessor::default()),
//!     Arc::new(GifEncoder::new(config.encoding.clone())),
//! );
//!
//! let rule = RecolorRule::new(Color::new(255, 0, 0), Color::new(0, 0, 255));
//! let settings = EditSettings::recolor(vec![rule]);
//!
//! if let RunOutcome::Completed(report) = scheduler
//!     .run_project(&frames, &settings, false, &CancellationFlag::new(), None)
//!     .await?
//! {
//!     std::fs::write("car_edited.gif", &report.animation.bytes)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`color`] - Colors and HSL conversion
//! - [`effects`] - Local recolor and background removal
//! - [`remote`] - AI edit service client with quota-aware retry
//! - [`frames`] - Frame type, GIF decoding and encoding
//! - [`pipeline`] - Frame worker pool, projects and batch scheduling
//! - [`config`] - Configuration management
//!
//! ## Custom Render Contexts
//!
//! Local processing draws on surfaces provided by a [`RenderContext`](effects::RenderContext).
//! Environments without raster support can supply one that declines:
//!
//! ```rust,no_run
//! use chromatic_gif::effects::RenderContext;
//! use chromatic_gif::frames::Frame;
//! use image::RgbaImage;
//!
//! struct NoRaster;
//!
//! impl RenderContext for NoRaster {
//!     fn name(&self) -> &str {
//!         "no-raster"
//!     }
//!
//!     fn surface_for(&self, _frame: &Frame) -> Option<RgbaImage> {
//!         None
//!     }
//!
//!     fn resize(&self, _image: &RgbaImage, _width: u32, _height: u32) -> Option<RgbaImage> {
//!         None
//!     }
//! }
//! ```

pub mod color;
pub mod config;
pub mod effects;
pub mod error;
pub mod frames;
pub mod pipeline;
pub mod remote;

// Re-export commonly used types for convenience
pub use crate::{
    color::Color,
    config::Config,
    effects::{EditMode, EditSettings, LocalFrameProcessor},
    error::{EditorError, Result},
    frames::{Frame, GifDecoder, GifEncoder},
    pipeline::{FrameJobScheduler, ProjectBatchScheduler, ProjectState},
    remote::RemoteEditClient,
};
