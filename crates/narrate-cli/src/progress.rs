use indicatif::{ProgressBar, ProgressStyle};

use narrate_client::{ProgressDisplay, ProgressSink};

/// One terminal progress bar per stage.
///
/// The bar is created on the first visible update and cleared when a
/// display turns hidden (completion or reset).
pub struct TerminalSink {
    label: String,
    bar: Option<ProgressBar>,
}

impl TerminalSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bar: None,
        }
    }

    fn bar(&mut self) -> &ProgressBar {
        let label = &self.label;
        self.bar.get_or_insert_with(|| {
            let style = ProgressStyle::with_template(
                "{spinner:.green} {prefix:>10} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
            let bar = ProgressBar::new(100).with_style(style);
            bar.set_prefix(label.clone());
            bar
        })
    }

    /// Clear the bar if it is still drawn.
    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for TerminalSink {
    fn show(&mut self, display: &ProgressDisplay) {
        if !display.visible {
            self.clear();
            return;
        }
        let bar = self.bar();
        bar.set_position(display.fraction.round() as u64);
        bar.set_message(display.message.clone());
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        self.clear();
    }
}
