//! Per-stage log events.
//!
//! A [`StageLog`] opens one `stage` span carrying the run id and stage, and
//! every event of that attempt is emitted inside it. Lines from a restarted
//! run can then be told apart from late lines of the one it replaced.

use std::fmt::Display;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn, Span};

use narrate_models::{RunId, Stage};

#[derive(Debug, Clone)]
pub struct StageLog {
    span: Span,
    stage: Stage,
    accepted_at: Option<Instant>,
}

impl StageLog {
    pub fn new(run_id: &RunId, stage: Stage) -> Self {
        Self {
            span: info_span!("stage", run_id = %run_id, stage = %stage),
            stage,
            accepted_at: None,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The start call is about to be sent. Durations are measured from here.
    pub fn accepted(&mut self) {
        self.accepted_at = Some(Instant::now());
        self.span
            .in_scope(|| info!("Request accepted, waiting for updates"));
    }

    pub fn rejected(&self, reason: &dyn Display) {
        self.span
            .in_scope(|| warn!(%reason, "Rejected before anything was sent"));
    }

    // Push streams can report several times a second.
    pub fn progress(&self, fraction: f64, message: &str) {
        self.span.in_scope(|| debug!(fraction, "{}", message));
    }

    pub fn regressed(&self, current: f64, reported: f64) {
        self.span.in_scope(|| {
            warn!(current, reported, "Progress went backwards, keeping {}%", current)
        });
    }

    pub fn succeeded(&self, message: &str) {
        let elapsed_ms = self.elapsed_ms();
        self.span
            .in_scope(|| info!(elapsed_ms, "Stage completed: {}", message));
    }

    pub fn failed(&self, message: &str) {
        let elapsed_ms = self.elapsed_ms();
        self.span
            .in_scope(|| error!(elapsed_ms, "Stage failed: {}", message));
    }

    /// The tracker went away with the subscription still open.
    pub fn abandoned(&self) {
        let elapsed_ms = self.elapsed_ms();
        self.span.in_scope(|| {
            warn!(elapsed_ms, "Abandoned before completion, subscription released")
        });
    }

    /// Milliseconds since `accepted`, or 0 if the request never went out.
    pub fn elapsed_ms(&self) -> u64 {
        self.accepted_at
            .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}
