//! The pipeline run: one job slot per stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::job::{JobState, PipelineJob};
use crate::output::{StageOutput, UploadedVideo};
use crate::script::Script;
use crate::stage::Stage;

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered job slots for one session.
///
/// Invariant: a stage is only ever out of `Idle` when every upstream stage
/// has succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    jobs: [PipelineJob; 5],
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: RunId::new(),
            jobs: Stage::ALL.map(PipelineJob::new),
        }
    }

    pub fn job(&self, stage: Stage) -> &PipelineJob {
        &self.jobs[stage.ordinal()]
    }

    pub fn jobs(&self) -> &[PipelineJob] {
        &self.jobs
    }

    /// Replace the slot for the job's stage.
    pub fn store(&mut self, job: PipelineJob) {
        let slot = job.stage.ordinal();
        self.jobs[slot] = job;
    }

    pub fn state(&self, stage: Stage) -> JobState {
        self.job(stage).state
    }

    /// First upstream stage that has not succeeded.
    pub fn blocked_by(&self, stage: Stage) -> Option<Stage> {
        stage
            .upstream()
            .iter()
            .copied()
            .find(|s| self.state(*s) != JobState::Succeeded)
    }

    /// Whether the stage may be started now.
    ///
    /// All upstream stages must have succeeded and the stage itself must be
    /// idle or failed (a failed stage may be retried).
    pub fn can_start(&self, stage: Stage) -> bool {
        self.blocked_by(stage).is_none()
            && matches!(self.state(stage), JobState::Idle | JobState::Failed)
    }

    /// The stage currently running, if any.
    pub fn running(&self) -> Option<Stage> {
        self.jobs.iter().find(|j| j.is_running()).map(|j| j.stage)
    }

    /// Force every stage after `stage` back to idle.
    pub fn reset_downstream(&mut self, stage: Stage) {
        for later in stage.downstream() {
            self.jobs[later.ordinal()].reset();
        }
    }

    /// Reset every stage to idle under a new run identity.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// True once every stage has succeeded.
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.state == JobState::Succeeded)
    }

    pub fn uploaded_video(&self) -> Option<&UploadedVideo> {
        match self.job(Stage::Upload).result.as_ref()? {
            StageOutput::Uploaded(video) => Some(video),
            _ => None,
        }
    }

    pub fn script(&self) -> Option<&Script> {
        match self.job(Stage::Analyze).result.as_ref()? {
            StageOutput::Script { script } => Some(script),
            _ => None,
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        match self.job(Stage::Synthesize).result.as_ref()? {
            StageOutput::Audio { audio_url } => Some(audio_url),
            _ => None,
        }
    }

    pub fn merged_video_url(&self) -> Option<&str> {
        match self.job(Stage::Merge).result.as_ref()? {
            StageOutput::Merged { merged_video_url } => Some(merged_video_url),
            _ => None,
        }
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}
