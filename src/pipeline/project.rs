use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::effects::EditSettings;
use crate::error::{PipelineError, Result};
use crate::frames::{EncodedAnimation, Frame};

/// Where a project is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    Idle,
    Processing,
    Encoding,
    Completed,
    Error,
}

impl ProjectStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProjectStatus::Processing | ProjectStatus::Encoding)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectStatus::Idle => "idle",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Encoding => "encoding",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// One frame sequence with its edit settings and run state
///
/// Only the scheduler running the project moves it between states;
/// `Completed` and `Error` are left only through [`ProjectState::reset`].
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub id: Uuid,
    pub name: String,
    pub settings: EditSettings,
    pub use_remote: bool,
    frames: Vec<Frame>,
    status: ProjectStatus,
    progress: f32,
    result: Option<EncodedAnimation>,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl ProjectState {
    pub fn new<S: Into<String>>(name: S, frames: Vec<Frame>, settings: EditSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            settings,
            use_remote: false,
            frames,
            status: ProjectStatus::Idle,
            progress: 0.0,
            result: None,
            error: None,
            finished_at: None,
        }
    }

    pub fn with_remote(mut self, use_remote: bool) -> Self {
        self.use_remote = use_remote;
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    /// Percentage of frames processed in the current run
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn result(&self) -> Option<&EncodedAnimation> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn transition(&mut self, allowed: &[ProjectStatus], to: ProjectStatus) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.status = to;
        Ok(())
    }

    pub fn begin_processing(&mut self) -> Result<()> {
        self.transition(&[ProjectStatus::Idle], ProjectStatus::Processing)?;
        self.progress = 0.0;
        self.error = None;
        Ok(())
    }

    /// Record progress; never moves backwards within a run
    pub fn set_progress(&mut self, percent: f32) {
        if self.status == ProjectStatus::Processing {
            self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        }
    }

    pub fn begin_encoding(&mut self) -> Result<()> {
        self.transition(&[ProjectStatus::Processing], ProjectStatus::Encoding)
    }

    pub fn complete(&mut self, result: EncodedAnimation) -> Result<()> {
        self.transition(
            &[ProjectStatus::Processing, ProjectStatus::Encoding],
            ProjectStatus::Completed,
        )?;
        self.progress = 100.0;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail<S: Into<String>>(&mut self, message: S) -> Result<()> {
        self.transition(
            &[ProjectStatus::Processing, ProjectStatus::Encoding],
            ProjectStatus::Error,
        )?;
        self.error = Some(message.into());
        self.result = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// A cancelled run goes back to Idle with progress cleared
    pub fn cancel_run(&mut self) -> Result<()> {
        self.transition(
            &[ProjectStatus::Processing, ProjectStatus::Encoding],
            ProjectStatus::Idle,
        )?;
        self.progress = 0.0;
        Ok(())
    }

    /// Explicitly return to Idle, discarding any result or error
    pub fn reset(&mut self) {
        self.status = ProjectStatus::Idle;
        self.progress = 0.0;
        self.result = None;
        self.error = None;
        self.finished_at = None;
    }
}
