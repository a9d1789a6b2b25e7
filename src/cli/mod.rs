//! Command-line interface for crustomize.
//!
//! Every command builds the merged template from a crustomize directory first
//! and then does something with it:
//!
//! - `apply` - print the template, or write `template.yml`/`params.json` with `--output`
//! - `validate` - validate the template with the cloud provider
//! - `deploy` - deploy the template to the manifest's stack, dispatching hooks
//! - `create-change-set` / `execute-change-set` / `delete-change-set` - the
//!   change set workflow for the same stack
//!
//! # Global Options
//!
//! - `--verbose` - debug logging
//! - `--quiet` - errors only
//! - `--config` - read defaults from this file instead of `.crustomizerc`
//!
//! # Example
//!
//! ```bash
//! crustomize apply ./stacks/web -r tera -o ./build
//! crustomize deploy ./stacks/web --profile prod --ci
//! ```

mod apply;
mod change_set;
pub mod common;
mod deploy;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RunConfig;
use crate::process::{SharedRunner, SystemRunner};
use common::{BuildArgs, CommandContext, HookArgs};

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Explicit config file
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Directive used when `RUST_LOG` is unset: this crate's modules at `log_level`.
    pub fn filter_directive(&self) -> String {
        format!("crustomize={}", self.log_level)
    }

    /// Install the global tracing subscriber. `RUST_LOG` wins over the flags.
    /// Logs go to stderr so template output on stdout stays clean.
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter_directive()));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    }
}

/// Build, validate and deploy layered CloudFormation templates.
#[derive(Parser, Debug)]
#[command(name = "crustomize", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Read defaults from this file instead of `.crustomizerc`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the template and print it or write it to `--output`
    Apply(apply::ApplyCommand),

    /// Build the template and validate it with the cloud provider
    Validate(validate::ValidateCommand),

    /// Build the template and deploy it to the manifest's stack
    Deploy(deploy::DeployCommand),

    /// Create a change set for the built template
    CreateChangeSet(change_set::CreateChangeSetCommand),

    /// Execute the change set for the built template
    ExecuteChangeSet(change_set::ExecuteChangeSetCommand),

    /// Delete the change set for the built template
    DeleteChangeSet(change_set::DeleteChangeSetCommand),
}

impl Commands {
    fn build_args(&self) -> (&BuildArgs, Option<&HookArgs>) {
        match self {
            Commands::Apply(cmd) => (&cmd.build, None),
            Commands::Validate(cmd) => (&cmd.build, None),
            Commands::Deploy(cmd) => (&cmd.build, Some(&cmd.hooks)),
            Commands::CreateChangeSet(cmd) => (&cmd.build, None),
            Commands::ExecuteChangeSet(cmd) => (&cmd.build, Some(&cmd.hooks)),
            Commands::DeleteChangeSet(cmd) => (&cmd.build, None),
        }
    }
}

impl Cli {
    /// Execute with the system process runner.
    pub async fn execute(self) -> Result<()> {
        self.execute_with_runner(Arc::new(SystemRunner)).await
    }

    /// Settings from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        CliConfig {
            log_level: log_level.to_string(),
            config_path: self.config.clone(),
        }
    }

    /// Execute, running external commands through `runner`.
    pub async fn execute_with_runner(self, runner: SharedRunner) -> Result<()> {
        let config = self.build_config();
        let defaults = RunConfig::load(config.config_path.as_deref()).await?;

        let (build, hooks) = self.command.build_args();
        let settings = build.settings(&defaults, hooks);
        tracing::debug!("Effective settings: {settings:?}");
        let ctx = CommandContext::new(settings, runner);

        match self.command {
            Commands::Apply(cmd) => cmd.execute(ctx).await,
            Commands::Validate(cmd) => cmd.execute(ctx).await,
            Commands::Deploy(cmd) => cmd.execute(ctx).await,
            Commands::CreateChangeSet(cmd) => cmd.execute(ctx).await,
            Commands::ExecuteChangeSet(cmd) => cmd.execute(ctx).await,
            Commands::DeleteChangeSet(cmd) => cmd.execute(ctx).await,
        }
    }
}
