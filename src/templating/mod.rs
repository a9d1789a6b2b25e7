//! Document templating.
//!
//! Every base, overlay and params document is rendered before it is parsed. Two
//! engines are available and both see the same context and the same helpers;
//! they differ only in syntax.
//!
//! # Template Context
//!
//! - `values`: the manifest's `values`
//! - `env`: the process environment, overridden key by key by an optional env file
//!
//! Helpers come from a [`HelperTable`] passed with the context. The table is
//! built per document, so `getFile` and `fileToBase64` resolve against the
//! directory of the document being rendered.
//!
//! # Examples
//!
//! Handlebars (the default):
//!
//! ```yaml
//! Resources:
//!   Bucket:
//!     Type: AWS::S3::Bucket
//!     Properties:
//!       BucketName: {{quote values.name}}
//!       Tags:
//! {{indent (toYaml values.tags) 8}}
//! ```
//!
//! Tera, where helpers are functions with named arguments or filters:
//!
//! ```yaml
//! Resources:
//!   Bucket:
//!     Type: AWS::S3::Bucket
//!     Properties:
//!       BucketName: {{ values.name | quote }}
//!       Code: {{ getFile(path="handler.py") | toBase64 }}
//! ```
//!
//! Neither engine escapes its output.

pub mod custom;
mod handlebars_backend;
pub mod helpers;
mod tera_backend;

pub use custom::HelperLoader;
pub use helpers::{HelperEnv, HelperFn, HelperTable, NamedFunction};

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::cfn;
use crate::core::{CrustomizeError, FileOps};

/// A supported template engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// `{{helper arg}}` syntax
    #[default]
    Handlebars,
    /// `{{ value | filter }}` / `{{ helper(name=value) }}` syntax
    Tera,
}

impl Engine {
    /// Name used in manifests and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Engine::Handlebars => "handlebars",
            Engine::Tera => "tera",
        }
    }
}

impl FromStr for Engine {
    type Err = CrustomizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "handlebars" => Ok(Engine::Handlebars),
            "tera" => Ok(Engine::Tera),
            other => Err(CrustomizeError::UnsupportedEngine {
                engine: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a single render call sees.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Manifest values
    pub values: Value,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Callable helpers
    pub helpers: HelperTable,
}

impl RenderContext {
    /// Context over `values` and `env` with the given helpers.
    pub fn new(values: Value, env: BTreeMap<String, String>, helpers: HelperTable) -> Self {
        Self {
            values,
            env,
            helpers,
        }
    }

    /// The data object templates are evaluated against.
    pub fn data(&self) -> Value {
        let env: Map<String, Value> =
            self.env.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
        let mut data = Map::new();
        data.insert("values".to_string(), self.values.clone());
        data.insert("env".to_string(), Value::Object(env));
        Value::Object(data)
    }
}

/// Render `raw` with the engine called `engine`.
///
/// Fails with [`CrustomizeError::UnsupportedEngine`] for an unknown name. When a
/// helper fails, its own error is returned (for example
/// [`CrustomizeError::FileNotFound`]); other engine failures become
/// [`CrustomizeError::TemplateRenderError`].
pub fn render(raw: &str, context: &RenderContext, engine: &str) -> Result<String> {
    let engine: Engine = engine.parse()?;
    render_with(raw, context, engine)
}

/// Render `raw` with an already-selected engine.
pub fn render_with(raw: &str, context: &RenderContext, engine: Engine) -> Result<String> {
    tracing::debug!("Rendering with {} ({} helpers)", engine, context.helpers.len());
    match engine {
        Engine::Handlebars => handlebars_backend::render(raw, context),
        Engine::Tera => tera_backend::render(raw, context),
    }
}

/// Process environment, overridden by the key/value pairs of `env_file`.
pub async fn load_env(env_file: Option<&Path>) -> Result<BTreeMap<String, String>> {
    let mut env: BTreeMap<String, String> = std::env::vars().collect();
    let Some(env_file) = env_file else {
        return Ok(env);
    };

    let text = FileOps::read_with_context(env_file, "reading env file").await?;
    let parsed = cfn::parse_document(&env_file.display().to_string(), &text)?;
    if let Value::Object(map) = parsed {
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            env.insert(key, value);
        }
    }
    tracing::debug!("Loaded env overrides from {}", env_file.display());
    Ok(env)
}

/// First helper failure seen during one render, kept so the caller gets the
/// helper's typed error instead of the engine's wrapper.
#[derive(Clone, Default)]
struct FailureSlot(Arc<Mutex<Option<anyhow::Error>>>);

impl FailureSlot {
    fn record(&self, error: anyhow::Error) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(error);
        }
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.0.lock().ok()?.take()
    }
}
