//! Test utilities for crustomize
//!
//! - [`init_test_logging`] - one-shot tracing setup for tests
//! - [`RecordingRunner`] - a [`CommandRunner`] that records calls and replays
//!   canned responses, so cloud lookups and command hooks can be tested offline
//!
//! # Example
//!
//! ```rust,no_run
//! use crustomize::test_utils::RecordingRunner;
//! use std::sync::Arc;
//!
//! let runner = Arc::new(RecordingRunner::new());
//! runner.respond("describe-stacks", r#"[{"OutputKey":"Url","OutputValue":"x"}]"#);
//! ```

use anyhow::Result;
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::process::{CommandOutput, CommandRunner, RunOptions};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither is set.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// One call observed by a [`RecordingRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Program name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Options the call was made with
    pub options: RunOptions,
}

struct Response {
    trigger: String,
    output: CommandOutput,
}

/// A [`CommandRunner`] that never starts a process.
///
/// A response is selected when its trigger equals the program name or any
/// argument; the most recently registered match wins. Unmatched calls succeed
/// with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<Vec<Response>>,
}

impl RecordingRunner {
    /// Runner with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for calls mentioning `trigger`.
    pub fn respond(&self, trigger: &str, stdout: &str) {
        self.push(trigger, CommandOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }

    /// Fail with `stderr` for calls mentioning `trigger`.
    pub fn fail(&self, trigger: &str, stderr: &str) {
        self.push(trigger, CommandOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
    }

    fn push(&self, trigger: &str, output: CommandOutput) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(Response {
                trigger: trigger.to_string(),
                output,
            });
        }
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String], options: &RunOptions) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                program: program.to_string(),
                args: args.to_vec(),
                options: options.clone(),
            });
        }

        let responses = self.responses.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        let output = responses
            .iter()
            .rev()
            .find(|r| r.trigger == program || args.iter().any(|a| *a == r.trigger))
            .map(|r| r.output.clone())
            .unwrap_or(CommandOutput {
                success: true,
                code: Some(0),
                ..CommandOutput::default()
            });
        Ok(output)
    }
}
