//! Progress reporting for long-running stages.
//!
//! The tracker reports every update to a [`ProgressSink`] without knowing
//! how it is displayed (terminal bar, log lines, a test recorder).

use narrate_models::clamp_fraction;
use tracing::debug;

/// What a progress indicator should show after one update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressDisplay {
    /// Percentage complete, clamped to [0, 100]
    pub fraction: f64,
    /// Status text, replacing the previous one
    pub message: String,
    /// Whether the indicator is shown
    pub visible: bool,
}

impl ProgressDisplay {
    /// Compute the display for a reported fraction and message.
    ///
    /// Completion (100) hides the indicator instead of freezing it full.
    /// Zero with an empty message is a reset and hides it as well.
    pub fn new(fraction: f64, message: &str) -> Self {
        let fraction = clamp_fraction(fraction);
        let visible = if fraction >= 100.0 {
            false
        } else if fraction == 0.0 {
            !message.is_empty()
        } else {
            true
        };

        Self {
            fraction,
            message: message.to_string(),
            visible,
        }
    }

    /// The reset display: empty and hidden.
    pub fn reset() -> Self {
        Self::new(0.0, "")
    }
}

/// Receiver of progress updates for one stage.
pub trait ProgressSink: Send {
    /// Show a computed display.
    fn show(&mut self, display: &ProgressDisplay);

    /// Render a raw fraction and message.
    fn render(&mut self, fraction: f64, message: &str) {
        self.show(&ProgressDisplay::new(fraction, message));
    }
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn show(&mut self, _display: &ProgressDisplay) {}
}

/// Sink that writes updates to the log.
#[derive(Debug, Clone)]
pub struct TracingSink {
    label: String,
}

impl TracingSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for TracingSink {
    fn show(&mut self, shown: &ProgressDisplay) {
        debug!(
            label = %self.label,
            fraction = shown.fraction,
            visible = shown.visible,
            "{}", shown.message
        );
    }
}
