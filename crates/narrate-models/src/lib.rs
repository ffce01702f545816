//! Shared data models for the narration pipeline client.
//!
//! This crate provides Serde-serializable types for:
//! - Pipeline stages and their ordering
//! - Per-stage jobs and the pipeline run that holds them
//! - Narration scripts and their editable text form
//! - Wire frames reported by the pipeline server
//! - Request bodies sent to the pipeline server

pub mod frame;
pub mod job;
pub mod output;
pub mod request;
pub mod run;
pub mod script;
pub mod stage;

// Re-export common types
pub use frame::{FrameError, StageFrame};
pub use job::{clamp_fraction, JobState, PipelineJob, ProgressRecord};
pub use output::{StageOutput, UploadedVideo};
pub use request::{PublishRequest, ServiceSettings, SpeechRequest};
pub use run::{PipelineRun, RunId};
pub use script::{Script, ScriptEntry, ScriptParseError};
pub use stage::Stage;
