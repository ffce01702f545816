//! Stage sequencing for one pipeline run.
//!
//! The sequencer owns the [`PipelineRun`] and is the only writer to it.
//! Each `start` builds a fresh [`JobTracker`], so a failed stage is retried
//! by calling `start` again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use narrate_models::{JobState, PipelineJob, PipelineRun, RunId, Stage};

use crate::client::StageBackend;
use crate::error::{PipelineError, PipelineResult};
use crate::progress::ProgressSink;
use crate::request::StageRequest;
use crate::tracker::JobTracker;

/// Result of a `start` call that was not rejected up front.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The stage was already running; nothing was sent.
    AlreadyRunning,
    /// The stage ran to a terminal state.
    Finished(PipelineJob),
    /// The run was restarted while the stage was in flight; its late
    /// updates were discarded.
    Superseded,
}

pub struct StageSequencer<B> {
    backend: Arc<B>,
    run: Arc<Mutex<PipelineRun>>,
    /// Cancelled and replaced on every restart; in-flight stages hold a clone.
    epoch: Arc<Mutex<CancellationToken>>,
    idle_timeout: Duration,
}

impl<B> Clone for StageSequencer<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            run: Arc::clone(&self.run),
            epoch: Arc::clone(&self.epoch),
            idle_timeout: self.idle_timeout,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: StageBackend + 'static> StageSequencer<B> {
    pub fn new(backend: B, idle_timeout: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            run: Arc::new(Mutex::new(PipelineRun::new())),
            epoch: Arc::new(Mutex::new(CancellationToken::new())),
            idle_timeout,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the run.
    pub fn current(&self) -> PipelineRun {
        lock(&self.run).clone()
    }

    pub fn job(&self, stage: Stage) -> PipelineJob {
        lock(&self.run).job(stage).clone()
    }

    pub fn can_start(&self, stage: Stage) -> bool {
        lock(&self.run).can_start(stage)
    }

    /// Reset every stage under a new run identity.
    ///
    /// A stage still in flight is cancelled: its update stream is closed
    /// right away and its `start` call returns `Superseded`.
    pub fn restart(&self) -> RunId {
        let mut run = lock(&self.run);
        let previous = std::mem::replace(&mut *lock(&self.epoch), CancellationToken::new());
        previous.cancel();
        run.reset();
        info!(run_id = %run.id, "Pipeline run restarted");
        run.id.clone()
    }

    /// Start a stage and drive it to a terminal state.
    ///
    /// Gating and validation errors are returned before anything is sent.
    /// Failures after that are recorded on the job and returned as
    /// `Finished` with a `Failed` job. Dropping the returned future releases
    /// the subscription and puts the stage back to `Idle`.
    pub async fn start(
        &self,
        request: StageRequest,
        sink: &mut dyn ProgressSink,
    ) -> PipelineResult<StartOutcome> {
        let stage = request.stage();

        let (mut tracker, run_id, cancelled) = {
            let mut run = lock(&self.run);
            if run.state(stage) == JobState::Running {
                info!(run_id = %run.id, stage = %stage, "Stage already running, ignoring start");
                return Ok(StartOutcome::AlreadyRunning);
            }
            if let Some(blocked_by) = run.blocked_by(stage) {
                return Err(PipelineError::NotReady { stage, blocked_by });
            }
            if run.state(stage) == JobState::Succeeded {
                return Err(PipelineError::AlreadySucceeded { stage });
            }

            let mut tracker = JobTracker::new(stage, &run.id, self.idle_timeout);
            tracker.begin(&request)?;
            run.store(tracker.job().clone());
            run.reset_downstream(stage);
            (tracker, run.id.clone(), lock(&self.epoch).clone())
        };

        // Runs on every exit, including the future being dropped mid-flight.
        let _abandon = scopeguard::guard(
            (Arc::clone(&self.run), run_id.clone()),
            move |(run, run_id)| {
                let mut run = lock(&run);
                if run.id == run_id && run.state(stage) == JobState::Running {
                    warn!(run_id = %run_id, stage = %stage, "Stage abandoned, back to idle");
                    run.store(PipelineJob::new(stage));
                }
            },
        );

        let opened = tokio::select! {
            biased;
            _ = cancelled.cancelled() => None,
            opened = self.backend.open(&request) => Some(opened),
        };
        match opened {
            Some(Ok(stream)) => tracker.attach(stream),
            Some(Err(e)) => tracker.fail(&e, sink),
            None => return Ok(supersede(&mut tracker)),
        }

        if !self.sync(&run_id, tracker.job()) {
            return Ok(supersede(&mut tracker));
        }

        while tracker.job().is_running() {
            let interrupted = tokio::select! {
                biased;
                _ = cancelled.cancelled() => true,
                _ = tracker.step(sink) => false,
            };
            if interrupted || !self.sync(&run_id, tracker.job()) {
                return Ok(supersede(&mut tracker));
            }
        }

        let job = tracker.job().clone();
        if stage == Stage::Publish && job.state == JobState::Succeeded {
            self.spawn_cleanup();
        }

        Ok(StartOutcome::Finished(job))
    }

    /// Write the tracker's job back to the run. Returns false when the run
    /// has been restarted since the stage began.
    fn sync(&self, run_id: &RunId, job: &PipelineJob) -> bool {
        let mut run = lock(&self.run);
        if run.id != *run_id {
            return false;
        }
        run.store(job.clone());
        if job.state == JobState::Failed {
            run.reset_downstream(job.stage);
        }
        true
    }

    fn spawn_cleanup(&self) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.cleanup().await {
                Ok(()) => info!("Server files cleaned up"),
                Err(e) => warn!("Cleanup after publish failed: {}", e),
            }
        });
    }
}

fn supersede(tracker: &mut JobTracker) -> StartOutcome {
    tracker.release();
    info!(stage = %tracker.stage(), "Run restarted, in-flight stage dropped");
    StartOutcome::Superseded
}
