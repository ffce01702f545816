//! Job tracking client for the narration pipeline server.
//!
//! This crate provides:
//! - An HTTP client for the pipeline server's stage endpoints
//! - Push-stream and single-response transports behind one frame stream
//! - Per-stage job tracking with progress reporting
//! - Stage sequencing with gating, single-flight and downstream reset

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod request;
pub mod sequencer;
pub mod tracker;
pub mod transport;

pub use client::{PipelineClient, StageBackend};
pub use config::ClientConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult, ValidationError};
pub use logging::StageLog;
pub use progress::{NoopSink, ProgressDisplay, ProgressSink, TracingSink};
pub use request::{guess_video_mime, StageRequest};
pub use sequencer::{StageSequencer, StartOutcome};
pub use tracker::JobTracker;
pub use transport::{decode_event_stream, FrameStream, SseDecoder};
