//! Per-stage job state.
//!
//! A [`PipelineJob`] is one execution attempt of one stage. It moves
//! `Idle -> Running -> {Succeeded, Failed}`; the terminal states are final
//! for the attempt, and a retry starts from a fresh job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::output::StageOutput;
use crate::stage::Stage;

/// Job processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Not started
    #[default]
    Idle,
    /// Waiting on the server
    Running,
    /// Completed with a result
    Succeeded,
    /// Ended with an error
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of recording a progress value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressRecord {
    /// Value stored
    Accepted,
    /// Value was lower than the current one and was ignored
    Regressed { current: f64, reported: f64 },
    /// Job is not running; nothing recorded
    Ignored,
}

/// One execution attempt of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub stage: Stage,
    pub state: JobState,
    /// Percentage complete (0-100), non-decreasing while running
    pub progress: f64,
    /// Latest status text, replaced on each update
    pub status_message: String,
    /// Present only when succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StageOutput>,
    /// Present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineJob {
    /// Create an idle job for a stage.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            state: JobState::Idle,
            progress: 0.0,
            status_message: String::new(),
            result: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move from `Idle` to `Running`. Returns false in any other state.
    pub fn begin(&mut self) -> bool {
        if self.state != JobState::Idle {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Record a progress update while running.
    ///
    /// The message always replaces the previous one, and a missing message
    /// clears it. A fraction lower than the current one is not stored.
    pub fn record_progress(
        &mut self,
        fraction: Option<f64>,
        message: Option<&str>,
    ) -> ProgressRecord {
        if self.state != JobState::Running {
            return ProgressRecord::Ignored;
        }

        self.status_message = message.unwrap_or_default().to_string();

        let Some(reported) = fraction else {
            return ProgressRecord::Accepted;
        };
        let reported = clamp_fraction(reported);
        if reported < self.progress {
            return ProgressRecord::Regressed {
                current: self.progress,
                reported,
            };
        }
        self.progress = reported;
        ProgressRecord::Accepted
    }

    /// Mark job as succeeded with its result.
    pub fn succeed(&mut self, result: StageOutput, message: impl Into<String>) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        self.state = JobState::Succeeded;
        self.progress = 100.0;
        self.status_message = message.into();
        self.result = Some(result);
        self.error_message = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        let error = error.into();
        self.state = JobState::Failed;
        self.status_message = error.clone();
        self.error_message = Some(error);
        self.result = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Return to a fresh idle job for the same stage.
    pub fn reset(&mut self) {
        *self = Self::new(self.stage);
    }
}

/// Clamp a reported percentage into [0, 100]; NaN counts as 0.
pub fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 100.0)
    }
}
