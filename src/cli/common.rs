//! Common arguments and plumbing for CLI commands

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::aws::{AwsCli, StackRequest};
use crate::config::RunConfig;
use crate::core::CrustomizeError;
use crate::hooks::HookRegistry;
use crate::lint::Linter;
use crate::manifest::{Manifest, StackSpec};
use crate::process::SharedRunner;
use crate::resolver::{Artifacts, BuildOutput, ResolveOptions, Resolver};
use crate::utils::Spinner;

/// Arguments shared by every command that builds a template.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Crustomize directory or manifest file
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Template engine (`handlebars` or `tera`)
    #[arg(short, long)]
    pub render: Option<String>,

    /// Cloud client profile
    #[arg(short, long)]
    pub profile: Option<String>,

    /// YAML file of environment overrides for templates
    #[arg(short, long)]
    pub env: Option<PathBuf>,

    /// Custom helper definitions (file or directory, `:`-separated)
    #[arg(long)]
    pub helpers: Option<String>,

    /// Write `template.yml` and `params.json` into this directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run cfn-lint over the built template
    #[arg(short, long)]
    pub lint: bool,

    /// Plain output without spinners
    #[arg(long)]
    pub ci: bool,
}

/// Hook arguments for the commands that dispatch hooks.
#[derive(Args, Debug, Clone, Default)]
pub struct HookArgs {
    /// Hook definitions (file or directory, `:`-separated)
    #[arg(long)]
    pub hooks: Option<String>,
}

/// Command-line arguments with config defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Crustomize directory or manifest file
    pub path: PathBuf,
    /// Engine name
    pub render: Option<String>,
    /// Cloud client profile
    pub profile: Option<String>,
    /// Env override file
    pub env: Option<PathBuf>,
    /// Custom helper sources
    pub helpers: Option<String>,
    /// Hook sources
    pub hooks: Option<String>,
    /// Artifact directory
    pub output: Option<PathBuf>,
    /// Run the linter
    pub lint: bool,
    /// Plain output
    pub ci: bool,
}

impl BuildArgs {
    /// Fill every option left unset on the command line from `config`.
    pub fn settings(&self, config: &RunConfig, hooks: Option<&HookArgs>) -> Settings {
        Settings {
            path: self.path.clone(),
            render: self.render.clone().or_else(|| config.render.clone()),
            profile: self.profile.clone().or_else(|| config.profile.clone()),
            env: self.env.clone().or_else(|| config.env.clone()),
            helpers: self.helpers.clone().or_else(|| config.helpers.clone()),
            hooks: hooks.and_then(|h| h.hooks.clone()).or_else(|| config.hooks.clone()),
            output: self.output.clone().or_else(|| config.output.clone()),
            lint: self.lint || config.lint.unwrap_or(false),
            ci: self.ci || config.ci.unwrap_or(false),
        }
    }
}

/// Everything a command needs to build and ship a template.
pub struct CommandContext {
    /// Effective settings
    pub settings: Settings,
    /// Runner for external commands
    pub runner: SharedRunner,
    /// Pipeline
    pub resolver: Resolver,
}

impl CommandContext {
    /// Context for `settings`, running external commands through `runner`.
    pub fn new(settings: Settings, runner: SharedRunner) -> Self {
        let options = ResolveOptions {
            render: settings.render.clone(),
            profile: settings.profile.clone(),
            env_file: settings.env.clone(),
            helpers: settings.helpers.clone(),
        };
        let resolver = Resolver::new(runner.clone(), options);
        Self {
            settings,
            runner,
            resolver,
        }
    }

    /// Run the pipeline over the configured path.
    pub async fn build(&self) -> Result<BuildOutput> {
        self.resolver.build(&self.settings.path).await
    }

    /// Cloud client for `manifest`.
    pub fn aws(&self, manifest: &Manifest) -> AwsCli {
        self.resolver.aws_for(manifest)
    }

    /// Lint `template` when linting was requested.
    pub async fn lint_if_requested(&self, template: &Path) -> Result<()> {
        if !self.settings.lint {
            return Ok(());
        }
        let linter = Linter::new(self.runner.clone());
        linter.ensure_installed()?;
        linter.lint(template).await
    }

    /// Hooks from the configured definition sources.
    pub fn hook_registry(&self) -> Result<HookRegistry> {
        let mut registry = HookRegistry::new();
        registry.load_definitions(self.settings.hooks.as_deref(), &self.runner)?;
        Ok(registry)
    }

    /// Spinner for a cloud call; in CI mode the message is printed instead.
    pub fn spinner(&self, message: &str) -> Spinner {
        if self.settings.ci {
            eprintln!("{message}");
        }
        Spinner::new(!self.settings.ci, message)
    }
}

/// Artifacts written for a cloud call. A temporary directory, when one was
/// needed, is removed when this is dropped.
#[derive(Debug)]
pub struct Staged {
    /// Written files
    pub artifacts: Artifacts,
    _temp: Option<TempDir>,
}

/// Write `output` into `dir`, or into a fresh temporary directory.
pub async fn stage(output: &BuildOutput, dir: Option<&Path>) -> Result<Staged> {
    match dir {
        Some(dir) => Ok(Staged {
            artifacts: output.write_to(dir).await?,
            _temp: None,
        }),
        None => {
            let temp = tempfile::tempdir().context("Failed to create a temporary directory")?;
            let artifacts = output.write_to(temp.path()).await?;
            Ok(Staged {
                artifacts,
                _temp: Some(temp),
            })
        }
    }
}

/// The manifest's stack, or [`CrustomizeError::StackRequired`].
pub fn require_stack(manifest: &Manifest) -> Result<&StackSpec> {
    manifest.stack.as_ref().ok_or_else(|| CrustomizeError::StackRequired.into())
}

/// Borrow `stack` and its `tags` as a cloud request.
pub fn stack_request<'a>(stack: &'a StackSpec, tags: &'a [(String, String)]) -> StackRequest<'a> {
    StackRequest {
        name: &stack.name,
        capabilities: &stack.capabilities,
        tags: tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
    }
}

/// Run a blocking cloud call off the async runtime.
pub async fn blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call).await.context("Cloud client task panicked")?
}

/// Print a success line.
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}
