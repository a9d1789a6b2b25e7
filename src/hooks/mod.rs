//! Custom resources and lifecycle hooks
//!
//! Entries under `Resources` whose `Type` starts with the custom-resource prefix
//! (`Crustomize::` by default) never reach the emitted template. [`extract`]
//! moves them into a side map keyed by the rest of the type name, and
//! [`HookRegistry::dispatch`] hands each one to the hook registered for that
//! name, once before the cloud action (`pre`) and once after it (`post`).
//!
//! ```yaml
//! Resources:
//!   Assets:
//!     Type: Crustomize::S3Sync
//!     Properties:
//!       Source: ./public
//! ```
//!
//! Hooks are registered in code with [`HookRegistry::register_fn`] or declared
//! in YAML definition files:
//!
//! ```yaml
//! hooks:
//!   S3Sync:
//!     command: ["./hooks/s3-sync.sh"]
//! ```
//!
//! A command hook receives the phase as its last argument, the resource as JSON
//! on stdin, and `CRUSTOMIZE_HOOK_PHASE` / `CRUSTOMIZE_RESOURCE_TYPE` in its
//! environment.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::constants::{DEFAULT_HOOKS_PATH, HOOKS_ENV_VAR};
use crate::core::CrustomizeError;
use crate::process::{RunOptions, SharedRunner};
use crate::templating::custom::{definition_files, definition_sources, read_definition_file};

/// Environment variable carrying the phase to command hooks.
pub const HOOK_PHASE_ENV_VAR: &str = "CRUSTOMIZE_HOOK_PHASE";

/// Environment variable carrying the resource type suffix to command hooks.
pub const HOOK_RESOURCE_TYPE_ENV_VAR: &str = "CRUSTOMIZE_RESOURCE_TYPE";

/// When a hook runs relative to the cloud action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the action
    Pre,
    /// After the action succeeded
    Post,
}

impl HookPhase {
    /// `"pre"` or `"post"`.
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::Pre => "pre",
            HookPhase::Post => "post",
        }
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource routed to a hook instead of the template.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomResource {
    /// `Type` with the prefix removed
    pub type_suffix: String,
    /// Key of the entry under `Resources`
    pub logical_id: String,
    /// The entry as it appeared in the merged document
    pub body: Value,
}

/// Custom resources keyed by type suffix.
pub type CustomResources = BTreeMap<String, CustomResource>;

/// Split custom resources out of `doc`.
///
/// Returns the document without them and the extracted resources. When two
/// entries share a type suffix the later one (in document order) wins.
pub fn extract(mut doc: Value, prefix: &str) -> (Value, CustomResources) {
    let mut found = CustomResources::new();
    let Some(resources) = doc.get_mut("Resources").and_then(Value::as_object_mut) else {
        return (doc, found);
    };

    let matching: Vec<(String, String)> = resources
        .iter()
        .filter_map(|(id, entry)| {
            let suffix = entry.get("Type")?.as_str()?.strip_prefix(prefix)?;
            Some((id.clone(), suffix.to_string()))
        })
        .collect();

    for (logical_id, type_suffix) in matching {
        let Some(body) = resources.shift_remove(&logical_id) else {
            continue;
        };
        tracing::debug!("Extracted custom resource {} ({})", logical_id, type_suffix);
        let resource = CustomResource {
            type_suffix: type_suffix.clone(),
            logical_id,
            body,
        };
        if let Some(previous) = found.insert(type_suffix.clone(), resource) {
            tracing::warn!(
                "Custom resource {} replaced {} for type {}",
                found[&type_suffix].logical_id,
                previous.logical_id,
                type_suffix
            );
        }
    }
    (doc, found)
}

/// Something that handles one custom resource type.
pub trait Hook: Send + Sync {
    /// Handle `resource` in `phase`.
    fn call(&self, phase: HookPhase, resource: &CustomResource) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Hook for F
where
    F: Fn(HookPhase, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, phase: HookPhase, resource: &CustomResource) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(phase, resource.body.clone()))
    }
}

/// Runs an external command for each call.
pub struct CommandHook {
    command: Vec<String>,
    runner: SharedRunner,
}

impl CommandHook {
    /// Hook running `command` (program first) through `runner`.
    pub fn new(command: Vec<String>, runner: SharedRunner) -> Self {
        Self {
            command,
            runner,
        }
    }
}

impl Hook for CommandHook {
    fn call(&self, phase: HookPhase, resource: &CustomResource) -> BoxFuture<'static, Result<()>> {
        let command = self.command.clone();
        let runner = self.runner.clone();
        let type_suffix = resource.type_suffix.clone();
        let body = resource.body.to_string();

        Box::pin(async move {
            let failed = |reason: String| CrustomizeError::HookFailed {
                type_suffix: type_suffix.clone(),
                phase: phase.to_string(),
                reason,
            };
            let Some((program, fixed)) = command.split_first() else {
                return Err(failed("empty command".to_string()).into());
            };
            let program = program.clone();
            let mut args = fixed.to_vec();
            args.push(phase.to_string());
            let options = RunOptions::default()
                .with_stdin(body)
                .with_env(HOOK_PHASE_ENV_VAR, phase.as_str())
                .with_env(HOOK_RESOURCE_TYPE_ENV_VAR, type_suffix.as_str());

            let output = tokio::task::spawn_blocking(move || runner.run(&program, &args, &options))
                .await
                .context("Hook task panicked")??;
            if output.success {
                Ok(())
            } else {
                let stderr = output.stderr.trim();
                let reason = if stderr.is_empty() {
                    format!("exit code {:?}", output.code)
                } else {
                    stderr.to_string()
                };
                Err(failed(reason).into())
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HookDefinition {
    command: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HookDefinitionFile {
    #[serde(default)]
    hooks: BTreeMap<String, HookDefinition>,
}

/// Hooks by type suffix.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `type_suffix`, replacing any earlier one.
    pub fn register(&mut self, type_suffix: impl Into<String>, hook: Arc<dyn Hook>) {
        let type_suffix = type_suffix.into();
        if self.hooks.insert(type_suffix.clone(), hook).is_some() {
            tracing::warn!("Hook for '{}' redefined", type_suffix);
        }
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, type_suffix: impl Into<String>, hook: F)
    where
        F: Fn(HookPhase, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(type_suffix, Arc::new(hook));
    }

    /// Register command hooks from definition files. `explicit` takes precedence
    /// over `CRUSTOMIZE_HOOKS`, which takes precedence over `crustomize_hooks`.
    ///
    /// Returns the number of hooks read.
    pub fn load_definitions(&mut self, explicit: Option<&str>, runner: &SharedRunner) -> Result<usize> {
        let mut count = 0;
        for source in definition_sources(explicit, HOOKS_ENV_VAR, DEFAULT_HOOKS_PATH) {
            for file in definition_files(&source)? {
                let parsed: HookDefinitionFile = read_definition_file(&file)?;
                tracing::debug!("Loaded {} hook(s) from {}", parsed.hooks.len(), file.display());
                for (type_suffix, definition) in parsed.hooks {
                    self.register(type_suffix, Arc::new(CommandHook::new(definition.command, runner.clone())));
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Whether a hook handles `type_suffix`.
    pub fn contains(&self, type_suffix: &str) -> bool {
        self.hooks.contains_key(type_suffix)
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the hook of every resource in `resources` for `phase`, in type order.
    ///
    /// Every resource must have a hook. The check happens before anything runs:
    /// a missing hook fails with [`CrustomizeError::MissingHook`] and no hook is
    /// called. The first failing hook stops the dispatch.
    pub async fn dispatch(&self, phase: HookPhase, resources: &CustomResources) -> Result<()> {
        let mut calls = Vec::with_capacity(resources.len());
        for (type_suffix, resource) in resources {
            let hook = self.hooks.get(type_suffix).ok_or_else(|| CrustomizeError::MissingHook {
                type_suffix: type_suffix.clone(),
            })?;
            calls.push((hook, resource));
        }

        for (hook, resource) in calls {
            tracing::info!("Running {} hook for {}", phase, resource.type_suffix);
            hook.call(phase, resource).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.hooks.keys().collect::<Vec<_>>()).finish()
    }
}
