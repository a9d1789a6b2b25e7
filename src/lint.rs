//! Template linting through `cfn-lint`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::CrustomizeError;
use crate::process::{RunOptions, SharedRunner};

/// Default linter executable.
pub const LINTER: &str = "cfn-lint";

/// Runs an external linter over a written template.
#[derive(Clone)]
pub struct Linter {
    program: String,
    runner: SharedRunner,
}

impl Linter {
    /// `cfn-lint` through `runner`.
    pub fn new(runner: SharedRunner) -> Self {
        Self::with_program(LINTER, runner)
    }

    /// A different linter executable.
    pub fn with_program(program: impl Into<String>, runner: SharedRunner) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Fail with [`CommandNotFound`](CrustomizeError::CommandNotFound) unless the
    /// linter is on `PATH`.
    pub fn ensure_installed(&self) -> Result<()> {
        which::which(&self.program).map(|_| ()).map_err(|_| {
            CrustomizeError::CommandNotFound {
                program: self.program.clone(),
            }
            .into()
        })
    }

    /// Lint `template`. A non-zero exit fails with
    /// [`LintFailed`](CrustomizeError::LintFailed) carrying the linter output.
    pub async fn lint(&self, template: &Path) -> Result<()> {
        let runner = self.runner.clone();
        let program = self.program.clone();
        let args = vec![template.display().to_string()];
        tracing::info!("Linting {}", template.display());

        let output =
            tokio::task::spawn_blocking(move || runner.run(&program, &args, &RunOptions::default()))
                .await
                .context("Lint task panicked")??;
        if output.success {
            return Ok(());
        }

        let diagnostics = [output.stdout.trim(), output.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        Err(CrustomizeError::LintFailed {
            diagnostics,
        }
        .into())
    }
}
