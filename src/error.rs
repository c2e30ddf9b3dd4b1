use thiserror::Error;

/// Main error type for the chromatic-gif library
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Remote edit error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Frame processing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Failures of the remote AI edit boundary
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote quota exhausted: {message}")]
    Quota { message: String },

    #[error("Remote service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote service returned no content (finish reason: {})", finish_reason.as_deref().unwrap_or("unknown"))]
    NoContent { finish_reason: Option<String> },

    #[error("Remote service returned no image in response")]
    NoImageInResponse,

    #[error("Remote image could not be decoded: {reason}")]
    UndecodableImage { reason: String },

    #[error("Remote request failed: {reason}")]
    Transport { reason: String },

    #[error("Remote edit service is not configured: {details}")]
    NotConfigured { details: String },

    #[error("Remote edit cancelled")]
    Cancelled,
}

/// Frame-level processing errors
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("No raster render context available for a {width}x{height} surface")]
    RenderContextUnavailable { width: u32, height: u32 },

    #[error("Failed to decode animation: {reason}")]
    DecodeFailed { reason: String },

    #[error("Invalid frame dimensions: {details}")]
    InvalidDimensions { details: String },
}

/// Encoder boundary errors
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Cannot encode an empty frame sequence")]
    EmptySequence,

    #[error("Animation encoding failed: {reason}")]
    EncodeFailed { reason: String },
}

/// Scheduling and project lifecycle errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Frame {index} failed: {source}")]
    FrameFailed {
        index: usize,
        #[source]
        source: Box<EditorError>,
    },

    #[error("Invalid project transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("A batch is already running")]
    BatchAlreadyRunning,

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No frames available to process")]
    NoFrames,

    #[error("No edit mode selected")]
    NoModeSelected,

    #[error("Invalid color: {value}")]
    InvalidColor { value: String },

    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

impl RemoteError {
    /// True when the failure is a quota or rate-limit condition.
    ///
    /// Matches HTTP 429 and any message mentioning "429", "quota" or "exhausted".
    pub fn is_quota(&self) -> bool {
        match self {
            Self::Quota { .. } => true,
            Self::Http { status: 429, .. } => true,
            Self::Http { message, .. } | Self::Transport { reason: message } => {
                message_signals_quota(message)
            }
            _ => false,
        }
    }
}

pub(crate) fn message_signals_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("quota") || lower.contains("exhausted")
}

impl EditorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(ConfigError::NoFrames) => {
                "No frames were loaded. Please select a valid animated GIF.".to_string()
            }
            Self::Config(ConfigError::NoModeSelected) => {
                "Select at least one edit mode (recolor or remove-bg).".to_string()
            }
            Self::Frame(FrameError::RenderContextUnavailable { .. }) => {
                "Local rendering is unavailable in this environment.".to_string()
            }
            Self::Encoding(err) => format!("Could not encode the edited animation: {}", err),
            Self::Pipeline(PipelineError::FrameFailed { index, source }) => {
                format!("Frame {} could not be processed. {}", index, source.user_message())
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        assert!(RemoteError::Quota { message: "x".into() }.is_quota());
        assert!(RemoteError::Http { status: 429, message: String::new() }.is_quota());
        assert!(RemoteError::Http { status: 400, message: "RESOURCE_EXHAUSTED".into() }.is_quota());
        assert!(RemoteError::Transport { reason: "Quota exceeded".into() }.is_quota());
        assert!(!RemoteError::Http { status: 500, message: "internal".into() }.is_quota());
        assert!(!RemoteError::NoImageInResponse.is_quota());
    }

    #[test]
    fn test_no_content_names_finish_reason() {
        let err = RemoteError::NoContent { finish_reason: Some("SAFETY".into()) };
        assert!(err.to_string().contains("SAFETY"));

        let err = RemoteError::NoContent { finish_reason: None };
        assert!(err.to_string().contains("no content"));
    }

    #[test]
    fn test_frame_failure_keeps_cause() {
        use std::error::Error as _;

        let err: EditorError = PipelineError::FrameFailed {
            index: 3,
            source: Box::new(FrameError::RenderContextUnavailable { width: 8, height: 8 }.into()),
        }
        .into();

        match &err {
            EditorError::Pipeline(PipelineError::FrameFailed { source, .. }) => assert!(matches!(
                **source,
                EditorError::Frame(FrameError::RenderContextUnavailable { .. })
            )),
            other => panic!("unexpected error: {:?}", other),
        }

        let cause = err.source().and_then(|pipeline| pipeline.source()).unwrap();
        assert!(cause.to_string().contains("render context"));
        assert!(err.user_message().contains("Frame 3"));
        assert!(err.user_message().contains("rendering is unavailable"));
    }
}
