//! Client error types.

use narrate_models::{FrameError, ScriptParseError, Stage};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pre-flight input problems, caught before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a video file.")]
    NoFile,

    #[error("The selected video file is empty.")]
    EmptyFile,

    #[error("Please select a valid video file (e.g. MP4, WebM, MOV); got {mime}.")]
    NotVideo { mime: String },

    #[error("{0}")]
    Script(#[from] ScriptParseError),

    #[error("Please enter a video title.")]
    EmptyTitle,

    #[error("Missing upload reference for the analysis stream.")]
    MissingUploadKey,

    #[error("Request is for {got}, not {expected}.")]
    WrongStage { expected: Stage, got: Stage },
}

/// Broad error category of a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caught before any network call; stage stays idle
    Validation,
    /// Network failure, non-success status, malformed or truncated stream
    Transport,
    /// The server reported `status: error`
    ServerReported,
    /// Stage ordering violated
    Sequence,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Transport(String),

    #[error("{message}")]
    ServerReported { stage: Stage, message: String },

    #[error("Cannot start {stage} before {blocked_by} has succeeded")]
    NotReady { stage: Stage, blocked_by: Stage },

    #[error("Cannot start {stage}: it has already succeeded in this run")]
    AlreadySucceeded { stage: Stage },

    #[error("Tracker for {stage} was already started")]
    TrackerUsed { stage: Stage },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl PipelineError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn server_reported(stage: Stage, msg: impl Into<String>) -> Self {
        Self::ServerReported {
            stage,
            message: msg.into(),
        }
    }

    /// Map onto the stage error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::ServerReported { .. } => ErrorKind::ServerReported,
            PipelineError::NotReady { .. }
            | PipelineError::AlreadySucceeded { .. }
            | PipelineError::TrackerUsed { .. } => ErrorKind::Sequence,
            PipelineError::Transport(_)
            | PipelineError::Network(_)
            | PipelineError::Json(_)
            | PipelineError::Frame(_)
            | PipelineError::Io(_)
            | PipelineError::Url(_) => ErrorKind::Transport,
        }
    }

    /// Text to show in the stage's message area.
    ///
    /// Transport failures without a server message get the stage's generic
    /// connection text.
    pub fn user_message(&self, stage: Stage) -> String {
        match self {
            PipelineError::Transport(msg) if !msg.trim().is_empty() => msg.clone(),
            PipelineError::ServerReported { message, .. } if !message.trim().is_empty() => {
                message.clone()
            }
            PipelineError::ServerReported { .. } => stage.default_error_message().to_string(),
            e if e.kind() == ErrorKind::Transport => stage.connection_error_message(),
            e => e.to_string(),
        }
    }
}
