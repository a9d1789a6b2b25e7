//! External command execution
//!
//! Every subprocess the crate starts (the cloud client, custom helper commands,
//! command hooks, the linter) goes through [`CommandRunner`]. Template helpers run
//! inside synchronous engine callbacks, so the trait is blocking; async callers
//! hop onto the blocking pool with [`tokio::task::spawn_blocking`].

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::core::CrustomizeError;

/// Optional settings for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Bytes written to the child's stdin
    pub stdin: Option<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl RunOptions {
    /// Run in `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Feed `input` on stdin.
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the exit status was zero
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

/// Runs external programs. Implementations must be usable from any thread.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// A non-zero exit is not an error at this level; see [`run_checked`].
    fn run(&self, program: &str, args: &[String], options: &RunOptions) -> Result<CommandOutput>;
}

/// Shared handle to a runner.
pub type SharedRunner = Arc<dyn CommandRunner>;

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], options: &RunOptions) -> Result<CommandOutput> {
        tracing::debug!("Executing command: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        cmd.stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CrustomizeError::CommandNotFound {
                    program: program.to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to start {program}"));
            }
        };

        if let (Some(input), Some(mut stdin)) = (&options.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .with_context(|| format!("Failed to write stdin of {program}"))?;
        }

        let output =
            child.wait_with_output().with_context(|| format!("Failed to wait for {program}"))?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.success {
            tracing::debug!("Command failed with exit code: {:?}", result.code);
        }
        Ok(result)
    }
}

/// Run a command and turn a non-zero exit into [`CrustomizeError::CommandFailed`].
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    options: &RunOptions,
) -> Result<String> {
    let output = runner.run(program, args, options)?;
    if output.success {
        Ok(output.stdout)
    } else {
        let stderr = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        Err(CrustomizeError::CommandFailed {
            program: format!("{program} {}", args.join(" ")),
            stderr: stderr.trim().to_string(),
        }
        .into())
    }
}
