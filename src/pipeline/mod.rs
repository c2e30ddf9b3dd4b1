//! # Pipeline Module
//!
//! Scheduling: the per-project frame worker pool, the project lifecycle, and
//! the batch scheduler that runs projects one at a time.

pub mod batch;
pub mod cancel;
pub mod project;
pub mod scheduler;

pub use batch::{new_store, BatchSummary, ProjectBatchScheduler, ProjectStore};
pub use cancel::CancellationFlag;
pub use project::{ProjectState, ProjectStatus};
pub use scheduler::{FrameJobScheduler, ProgressSink, RunEvent, RunOutcome, RunReport};
