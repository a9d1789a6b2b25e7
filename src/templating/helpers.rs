//! Helper functions available to every template.
//!
//! Helpers are plain Rust closures collected in a [`HelperTable`] that is passed
//! to each render call. Both engines adapt the same table, so a helper behaves
//! identically whichever syntax calls it:
//!
//! | name             | arguments              | result                                   |
//! |------------------|------------------------|------------------------------------------|
//! | `indent`         | `text, n`              | every line prefixed with `n` spaces      |
//! | `toYaml`         | `value`                | YAML text, no trailing newline           |
//! | `quote`          | `value`                | `"value"` with embedded `"` escaped      |
//! | `trunc`          | `text, n`              | first `n` characters                     |
//! | `toBase64`       | `text`                 | standard base64                          |
//! | `getFile`        | `path`                 | file text, relative to the document      |
//! | `fileToBase64`   | `path`                 | file bytes as base64                     |
//! | `lookupCfOutput` | `stack, key`           | stack output value                       |
//! | `getParameter`   | `name, query?`         | parameter store value                    |
//! | `valueOrDefault` | `value, fallback`      | `value` unless null                      |

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aws::AwsCli;
use crate::cfn;
use crate::core::CrustomizeError;
use crate::process::SharedRunner;

/// Signature of every helper: positional arguments in, one value out.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A helper and the names of its parameters.
///
/// Handlebars passes arguments positionally; Tera passes them by name, and
/// `params` gives the order in which named arguments are laid out.
#[derive(Clone)]
pub struct NamedFunction {
    /// Name templates call it by
    pub name: String,
    /// Parameter names, in positional order
    pub params: Vec<String>,
    func: HelperFn,
}

impl NamedFunction {
    /// Wrap a closure.
    pub fn new<F>(name: impl Into<String>, params: &[&str], func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.iter().map(ToString::to_string).collect(),
            func: Arc::new(func),
        }
    }

    /// Invoke with positional arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for NamedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// The helper set handed to one render call.
#[derive(Debug, Clone, Default)]
pub struct HelperTable {
    functions: BTreeMap<String, NamedFunction>,
}

impl HelperTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the fixed helpers, bound to `env`.
    pub fn with_builtins(env: &HelperEnv) -> Self {
        let mut table = Self::new();
        for function in builtins(env) {
            table.register(function);
        }
        table
    }

    /// Add a helper, returning the one it replaced.
    pub fn register(&mut self, function: NamedFunction) -> Option<NamedFunction> {
        self.functions.insert(function.name.clone(), function)
    }

    /// Look a helper up by name.
    pub fn get(&self, name: &str) -> Option<&NamedFunction> {
        self.functions.get(name)
    }

    /// All helpers, by name.
    pub fn iter(&self) -> impl Iterator<Item = &NamedFunction> {
        self.functions.values()
    }

    /// Number of helpers.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// What a helper may depend on: the document's directory, the cloud profile and
/// a way to run external commands.
#[derive(Clone)]
pub struct HelperEnv {
    /// Directory of the document being rendered
    pub working_directory: PathBuf,
    /// Cloud client profile
    pub profile: Option<String>,
    /// Runner for external commands
    pub runner: SharedRunner,
}

impl HelperEnv {
    /// Bundle for a document living in `working_directory`.
    pub fn new(
        working_directory: impl Into<PathBuf>,
        profile: Option<String>,
        runner: SharedRunner,
    ) -> Self {
        Self {
            working_directory: working_directory.into(),
            profile,
            runner,
        }
    }

    /// Cloud client using this bundle's runner and profile.
    pub fn aws(&self) -> AwsCli {
        AwsCli::new(self.runner.clone(), self.profile.clone())
    }
}

impl std::fmt::Debug for HelperEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperEnv")
            .field("working_directory", &self.working_directory)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

fn builtins(env: &HelperEnv) -> Vec<NamedFunction> {
    let dir = env.working_directory.clone();
    let file_dir = dir.clone();
    let outputs = env.aws();
    let parameters = env.aws();

    vec![
        NamedFunction::new("indent", &["text", "n"], |args| {
            let text = text_arg("indent", args, 0)?;
            let pad = " ".repeat(count_arg("indent", args, 1)?);
            let indented: Vec<String> = text.split('\n').map(|line| format!("{pad}{line}")).collect();
            Ok(Value::String(indented.join("\n")))
        }),
        NamedFunction::new("toYaml", &["value"], |args| {
            let yaml = cfn::to_yaml_string(arg("toYaml", args, 0)?)?;
            Ok(Value::String(yaml.trim_end_matches('\n').to_string()))
        }),
        NamedFunction::new("quote", &["value"], |args| {
            let text = text_arg("quote", args, 0)?;
            Ok(Value::String(format!("\"{}\"", text.replace('"', "\\\""))))
        }),
        NamedFunction::new("trunc", &["text", "n"], |args| {
            let text = text_arg("trunc", args, 0)?;
            let n = count_arg("trunc", args, 1)?;
            Ok(Value::String(text.chars().take(n).collect()))
        }),
        NamedFunction::new("toBase64", &["text"], |args| {
            Ok(Value::String(STANDARD.encode(text_arg("toBase64", args, 0)?)))
        }),
        NamedFunction::new("getFile", &["path"], move |args| {
            let bytes = read_relative(&dir, &text_arg("getFile", args, 0)?)?;
            Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        }),
        NamedFunction::new("fileToBase64", &["path"], move |args| {
            let bytes = read_relative(&file_dir, &text_arg("fileToBase64", args, 0)?)?;
            Ok(Value::String(STANDARD.encode(bytes)))
        }),
        NamedFunction::new("lookupCfOutput", &["stack", "key"], move |args| {
            let stack = text_arg("lookupCfOutput", args, 0)?;
            let key = text_arg("lookupCfOutput", args, 1)?;
            Ok(Value::String(outputs.lookup_output(&stack, &key)?))
        }),
        NamedFunction::new("getParameter", &["name", "query"], move |args| {
            let name = text_arg("getParameter", args, 0)?;
            let query = match args.get(1) {
                None | Some(Value::Null) => None,
                Some(_) => Some(text_arg("getParameter", args, 1)?),
            };
            Ok(Value::String(parameters.get_parameter(&name, query.as_deref())?))
        }),
        NamedFunction::new("valueOrDefault", &["value", "fallback"], |args| {
            Ok(match args.first() {
                Some(value) if !value.is_null() => value.clone(),
                _ => args.get(1).cloned().unwrap_or(Value::Null),
            })
        }),
    ]
}

fn arg<'a>(helper: &str, args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index).ok_or_else(|| {
        CrustomizeError::HelperError {
            name: helper.to_string(),
            reason: format!("missing argument {}", index + 1),
        }
        .into()
    })
}

/// String form of an argument: strings as-is, other values as JSON text.
fn text_arg(helper: &str, args: &[Value], index: usize) -> Result<String> {
    Ok(match arg(helper, args, index)? {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn count_arg(helper: &str, args: &[Value], index: usize) -> Result<usize> {
    let value = arg(helper, args, index)?;
    let count = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.and_then(|n| usize::try_from(n).ok()).ok_or_else(|| {
        CrustomizeError::HelperError {
            name: helper.to_string(),
            reason: format!("expected a non-negative count, got {value}"),
        }
        .into()
    })
}

fn read_relative(dir: &Path, relative: &str) -> Result<Vec<u8>> {
    let path = dir.join(relative);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CrustomizeError::FileNotFound {
            path: path.display().to_string(),
        }
        .into()),
        Err(e) => Err(e.into()),
    }
}
