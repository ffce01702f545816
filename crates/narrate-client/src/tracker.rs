//! Job tracking for one in-flight stage.
//!
//! A [`JobTracker`] owns the [`PipelineJob`] of a single attempt and the
//! subscription reporting on it. Updates from either transport are reduced
//! to progress, success or failure:
//!
//! - `begin` validates the request and moves `Idle -> Running`
//! - `attach` hands over the stream returned by the start call
//! - `step` reads one update (bounded by the idle timeout) and applies it
//! - any terminal update releases the subscription
//!
//! Dropping the tracker also releases the subscription. No cancellation
//! is sent to the server.

use std::time::Duration;

use futures_util::StreamExt;
use metrics::counter;

use narrate_models::{JobState, PipelineJob, ProgressRecord, RunId, Stage, StageFrame, StageOutput};

use crate::error::{PipelineError, PipelineResult, ValidationError};
use crate::logging::StageLog;
use crate::progress::{ProgressDisplay, ProgressSink};
use crate::request::StageRequest;
use crate::transport::FrameStream;

/// State machine and subscription owner for one stage attempt.
pub struct JobTracker {
    job: PipelineJob,
    subscription: Option<FrameStream>,
    idle_timeout: Duration,
    log: StageLog,
}

impl JobTracker {
    pub fn new(stage: Stage, run_id: &RunId, idle_timeout: Duration) -> Self {
        Self {
            job: PipelineJob::new(stage),
            subscription: None,
            idle_timeout,
            log: StageLog::new(run_id, stage),
        }
    }

    pub fn stage(&self) -> Stage {
        self.job.stage
    }

    pub fn job(&self) -> &PipelineJob {
        &self.job
    }

    pub fn state(&self) -> JobState {
        self.job.state
    }

    /// Whether an update stream is currently held.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Validate the request and move to `Running`.
    ///
    /// On a validation error the job stays `Idle` and nothing is sent.
    pub fn begin(&mut self, request: &StageRequest) -> PipelineResult<()> {
        let stage = self.stage();
        if request.stage() != stage {
            return Err(ValidationError::WrongStage {
                expected: stage,
                got: request.stage(),
            }
            .into());
        }

        if let Err(e) = request.validate() {
            self.log.rejected(&e);
            return Err(e.into());
        }

        if !self.job.begin() {
            return Err(PipelineError::TrackerUsed { stage });
        }

        counter!("narrate_stage_started_total", "stage" => stage.as_str()).increment(1);
        self.log.accepted();
        Ok(())
    }

    /// Take ownership of the stream reporting on this job.
    ///
    /// Ignored unless the job is running; a later stream replaces (and
    /// closes) an earlier one.
    pub fn attach(&mut self, stream: FrameStream) {
        if self.job.is_running() {
            self.subscription = Some(stream);
        }
    }

    /// Drop the update stream, closing its connection.
    pub fn release(&mut self) {
        self.subscription = None;
    }

    /// Apply one decoded update.
    pub fn apply(&mut self, frame: StageFrame, sink: &mut dyn ProgressSink) {
        if !self.job.is_running() {
            return;
        }

        let stage = self.stage();
        let message = frame.message().map(str::to_string);

        match frame {
            StageFrame::InProgress { progress, .. } => {
                let record = self.job.record_progress(progress, message.as_deref());
                if let ProgressRecord::Regressed { current, reported } = record {
                    counter!("narrate_progress_regressions_total", "stage" => stage.as_str())
                        .increment(1);
                    self.log.regressed(current, reported);
                }
                self.log.progress(self.job.progress, &self.job.status_message);
                sink.render(self.job.progress, &self.job.status_message);
            }
            StageFrame::Complete { fields, .. } => match StageOutput::decode(stage, &fields) {
                Ok(output) => {
                    self.release();
                    let message = message.unwrap_or_else(|| format!("{} complete", stage));
                    self.job.succeed(output, message.clone());
                    counter!("narrate_stage_succeeded_total", "stage" => stage.as_str())
                        .increment(1);
                    self.log.succeeded(&message);
                    sink.render(100.0, &message);
                }
                Err(e) => {
                    self.fail(
                        &PipelineError::transport(format!("Malformed {} result: {}", stage, e)),
                        sink,
                    );
                }
            },
            StageFrame::Error { .. } => {
                let message =
                    message.unwrap_or_else(|| stage.default_error_message().to_string());
                self.fail(&PipelineError::server_reported(stage, message), sink);
            }
        }
    }

    /// Move to `Failed`, releasing the subscription.
    pub fn fail(&mut self, error: &PipelineError, sink: &mut dyn ProgressSink) {
        self.release();
        let message = error.user_message(self.stage());
        if self.job.fail(message.clone()) {
            counter!("narrate_stage_failed_total", "stage" => self.stage().as_str()).increment(1);
            self.log.failed(&message);
            sink.show(&ProgressDisplay::reset());
        }
    }

    /// Read and apply the next update. Returns the resulting state.
    ///
    /// A stream that ends, errors, or stays silent past the idle timeout
    /// fails the job.
    pub async fn step(&mut self, sink: &mut dyn ProgressSink) -> JobState {
        if !self.job.is_running() {
            return self.job.state;
        }

        let Some(stream) = self.subscription.as_mut() else {
            self.fail(&PipelineError::transport("No update stream attached"), sink);
            return self.job.state;
        };

        let next = tokio::time::timeout(self.idle_timeout, stream.next()).await;
        match next {
            Ok(Some(Ok(frame))) => self.apply(frame, sink),
            Ok(Some(Err(e))) => self.fail(&e, sink),
            Ok(None) => {
                let error = PipelineError::transport(self.stage().connection_error_message());
                self.fail(&error, sink);
            }
            Err(_) => {
                let error = PipelineError::transport(format!(
                    "No update from the server for {} seconds.",
                    self.idle_timeout.as_secs()
                ));
                self.fail(&error, sink);
            }
        }

        self.job.state
    }

    /// Drive the job to a terminal state.
    pub async fn run(&mut self, sink: &mut dyn ProgressSink) -> &PipelineJob {
        while self.job.is_running() {
            self.step(sink).await;
        }
        &self.job
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        if self.subscription.take().is_some() && self.job.is_running() {
            self.log.abandoned();
        }
    }
}
