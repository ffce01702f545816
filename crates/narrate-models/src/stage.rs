//! Pipeline stage definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered steps of the narration pipeline.
///
/// The derived ordering follows the pipeline: a stage may only leave
/// `Idle` once every stage that compares less than it has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Send the source video to the server
    Upload,
    /// Server-side analysis producing the narration script
    Analyze,
    /// Text-to-speech synthesis of the edited script
    Synthesize,
    /// Mux the synthesized audio into the video
    Merge,
    /// Upload the merged video to the hosting platform
    Publish,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Analyze,
        Stage::Synthesize,
        Stage::Merge,
        Stage::Publish,
    ];

    /// Zero-based position in the pipeline.
    pub fn ordinal(self) -> usize {
        match self {
            Stage::Upload => 0,
            Stage::Analyze => 1,
            Stage::Synthesize => 2,
            Stage::Merge => 3,
            Stage::Publish => 4,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// The stage that precedes this one, if any.
    pub fn previous(self) -> Option<Stage> {
        self.ordinal().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Stages that come after this one.
    pub fn downstream(self) -> &'static [Stage] {
        &Self::ALL[self.ordinal() + 1..]
    }

    /// Stages that come before this one.
    pub fn upstream(self) -> &'static [Stage] {
        &Self::ALL[..self.ordinal()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Analyze => "analyze",
            Stage::Synthesize => "synthesize",
            Stage::Merge => "merge",
            Stage::Publish => "publish",
        }
    }

    /// Message shown when the server reports an error without text.
    pub fn default_error_message(&self) -> &'static str {
        match self {
            Stage::Upload => "Video upload failed.",
            Stage::Analyze => "Video analysis failed.",
            Stage::Synthesize => "Speech generation failed.",
            Stage::Merge => "Video merge failed.",
            Stage::Publish => "Video publishing failed.",
        }
    }

    /// Message used when the connection itself fails.
    pub fn connection_error_message(&self) -> String {
        format!(
            "{} due to connection error.",
            self.default_error_message().trim_end_matches('.')
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
