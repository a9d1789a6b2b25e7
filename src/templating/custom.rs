//! Operator-supplied helpers.
//!
//! Custom helpers are declared in YAML definition files and run an external
//! command when called:
//!
//! ```yaml
//! helpers:
//!   randomInt:
//!     params: [min, max]
//!     command: ["sh", "-c", "shuf -i $1-$2 -n 1", "randomInt"]
//!     output: text
//! ```
//!
//! The call arguments are appended to `command`. The command runs in the
//! directory of the document being rendered, with `CRUSTOMIZE_PROFILE` set when a
//! profile is active. `output: json` parses stdout as JSON; `text` (the default)
//! returns it trimmed.
//!
//! Definition sources are chosen by precedence: explicit paths, then the
//! `CRUSTOMIZE_HELPERS` environment variable, then `crustomize_helpers` in the
//! current directory. A source may be a file or a directory of `.yml`/`.yaml`
//! files, and a value may name several sources separated by `:`.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::helpers::{HelperEnv, HelperTable, NamedFunction};
use crate::constants::{DEFAULT_HELPERS_PATH, HELPERS_ENV_VAR, PROFILE_ENV_VAR};
use crate::core::{CrustomizeError, FileOperation, FileResultExt};
use crate::process::{RunOptions, run_checked};

/// How a helper's stdout becomes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperOutput {
    /// Trimmed text
    #[default]
    Text,
    /// Parsed JSON
    Json,
}

/// One declared helper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelperDefinition {
    /// Parameter names
    #[serde(default)]
    pub params: Vec<String>,
    /// Program followed by its fixed arguments
    pub command: Vec<String>,
    /// Output interpretation
    #[serde(default)]
    pub output: HelperOutput,
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    helpers: BTreeMap<String, HelperDefinition>,
}

/// Resolve definition sources: explicit value, then `env_var`, then `default`.
///
/// Only the default is allowed to be missing; it is dropped silently.
pub fn definition_sources(explicit: Option<&str>, env_var: &str, default: &str) -> Vec<PathBuf> {
    let (raw, is_default) = match explicit.map(str::to_string).or_else(|| std::env::var(env_var).ok()) {
        Some(value) if !value.trim().is_empty() => (value, false),
        _ => (default.to_string(), true),
    };

    let mut sources: Vec<PathBuf> = Vec::new();
    for part in raw.split(':').map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(part);
        if !sources.contains(&path) {
            sources.push(path);
        }
    }
    if is_default {
        sources.retain(|p| p.exists());
    }
    sources
}

/// Definition files under `source`: the file itself, or a directory's YAML files
/// in name order.
pub(crate) fn definition_files(source: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(source)
        .with_file_context(FileOperation::ListDir, source, "listing definition files")?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
        })
        .collect();
    files.sort();
    Ok(files)
}

pub(crate) fn read_definition_file<T: serde::de::DeserializeOwned>(file: &Path) -> Result<T> {
    let text = std::fs::read_to_string(file).with_file_context(
        FileOperation::Read,
        file,
        "reading definition file",
    )?;
    serde_yaml::from_str(&text).map_err(|e| {
        CrustomizeError::ConfigError {
            message: format!("Invalid definition file {}: {e}", file.display()),
        }
        .into()
    })
}

/// Loads custom helper definitions once and registers them into helper tables.
///
/// Create one per process run. The first [`HelperLoader::register_into`] reads
/// the definition files; later calls reuse what was read.
#[derive(Debug, Default)]
pub struct HelperLoader {
    explicit: Option<String>,
    definitions: OnceLock<Vec<(String, HelperDefinition)>>,
}

impl HelperLoader {
    /// Loader honouring an explicit `--helpers` value when given.
    pub fn new(explicit: Option<String>) -> Self {
        Self {
            explicit,
            definitions: OnceLock::new(),
        }
    }

    fn definitions(&self) -> Result<&[(String, HelperDefinition)]> {
        if let Some(loaded) = self.definitions.get() {
            return Ok(loaded);
        }
        let loaded = self.load()?;
        Ok(self.definitions.get_or_init(|| loaded))
    }

    fn load(&self) -> Result<Vec<(String, HelperDefinition)>> {
        let mut loaded: Vec<(String, HelperDefinition)> = Vec::new();
        let sources = definition_sources(self.explicit.as_deref(), HELPERS_ENV_VAR, DEFAULT_HELPERS_PATH);
        for source in sources {
            for file in definition_files(&source)? {
                let parsed: DefinitionFile = read_definition_file(&file)?;
                tracing::debug!("Loaded {} helper(s) from {}", parsed.helpers.len(), file.display());
                for (name, definition) in parsed.helpers {
                    if let Some(index) = loaded.iter().position(|(n, _)| *n == name) {
                        tracing::warn!("Helper '{}' redefined in {}", name, file.display());
                        loaded.remove(index);
                    }
                    loaded.push((name, definition));
                }
            }
        }
        Ok(loaded)
    }

    /// Number of custom helpers, loading them if needed.
    pub fn len(&self) -> Result<usize> {
        Ok(self.definitions()?.len())
    }

    /// Whether there are no custom helpers.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Add every custom helper to `table`, bound to `env`. A custom helper
    /// replaces a fixed one of the same name.
    pub fn register_into(&self, table: &mut HelperTable, env: &HelperEnv) -> Result<()> {
        for (name, definition) in self.definitions()? {
            let function = command_helper(name, definition, env);
            if table.register(function).is_some() {
                tracing::warn!("Custom helper '{}' replaces an existing helper", name);
            }
        }
        Ok(())
    }
}

fn command_helper(name: &str, definition: &HelperDefinition, env: &HelperEnv) -> NamedFunction {
    let params: Vec<&str> = definition.params.iter().map(String::as_str).collect();
    let definition = definition.clone();
    let env = env.clone();
    let helper = name.to_string();

    NamedFunction::new(name, &params, move |args| {
        let Some((program, fixed)) = definition.command.split_first() else {
            return Err(CrustomizeError::HelperError {
                name: helper.clone(),
                reason: "empty command".to_string(),
            }
            .into());
        };
        let mut argv: Vec<String> = fixed.to_vec();
        argv.extend(args.iter().map(|a| match a {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }));

        let mut options = RunOptions::in_dir(&env.working_directory);
        if let Some(profile) = &env.profile {
            options = options.with_env(PROFILE_ENV_VAR, profile);
        }

        let stdout = run_checked(env.runner.as_ref(), program, &argv, &options)?;
        match definition.output {
            HelperOutput::Text => Ok(Value::String(stdout.trim().to_string())),
            HelperOutput::Json => serde_json::from_str(stdout.trim()).map_err(|e| {
                CrustomizeError::HelperError {
                    name: helper.clone(),
                    reason: format!("output is not JSON: {e}"),
                }
                .into()
            }),
        }
    })
}
