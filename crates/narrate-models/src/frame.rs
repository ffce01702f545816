//! Wire frames reported by the pipeline server.
//!
//! Every progress or terminal update is a JSON object tagged by `status`.
//! Decoding is strict about the tag and lenient about optional fields: an
//! unknown status or a body that is not a JSON object is a [`FrameError`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One update of a long-running stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageFrame {
    /// Work is ongoing
    InProgress {
        /// Percentage complete (0-100)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Work finished; stage-specific result fields travel alongside
    #[serde(alias = "success")]
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },

    /// Work failed on the server
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Older server builds report the reason here instead
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StageFrame {
    /// Decode a frame from its JSON text.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text.trim())?)
    }

    /// Create a progress frame.
    pub fn in_progress(progress: f64, message: impl Into<String>) -> Self {
        StageFrame::InProgress {
            progress: Some(progress),
            message: Some(message.into()),
        }
    }

    /// Create a completion frame with no result fields.
    pub fn complete(message: impl Into<String>) -> Self {
        StageFrame::Complete {
            message: Some(message.into()),
            fields: Map::new(),
        }
    }

    /// Create an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        StageFrame::Error {
            message: Some(message.into()),
            error: None,
        }
    }

    /// Whether this frame ends the stage.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageFrame::InProgress { .. })
    }

    /// Human-readable text carried by the frame, if any.
    pub fn message(&self) -> Option<&str> {
        let text = match self {
            StageFrame::InProgress { message, .. } | StageFrame::Complete { message, .. } => {
                message.as_deref()
            }
            StageFrame::Error { message, error } => message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .or(error.as_deref()),
        };
        text.filter(|m| !m.trim().is_empty())
    }
}
