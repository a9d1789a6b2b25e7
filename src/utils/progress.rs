//! Spinners for long-running operations.
//!
//! Spinners draw to stderr so stdout stays a clean document stream, and are
//! hidden entirely in CI mode.
//!
//! ```rust,no_run
//! use crustomize::utils::progress::Spinner;
//!
//! let spinner = Spinner::new(true, "Deploying stack...");
//! // deploy
//! spinner.finish_with_message("Stack deployed");
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// A steady-ticking spinner, or nothing when disabled.
#[derive(Debug, Clone)]
pub struct Spinner {
    inner: IndicatifBar,
}

impl Spinner {
    /// Start a spinner showing `message`. `enabled == false` gives a hidden one.
    pub fn new(enabled: bool, message: impl Into<String>) -> Self {
        let bar = if enabled {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        bar.set_message(message.into());
        Self {
            inner: bar,
        }
    }

    /// Whether anything is drawn.
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Replace the message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.set_message(message.into());
    }

    /// Stop, leaving `message` on screen.
    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.inner.finish_with_message(message.into());
    }

    /// Stop and erase the spinner.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
