//! Tera adapter.
//!
//! Each helper is registered twice: as a function taking named arguments laid
//! out by [`NamedFunction::params`], and as a filter whose piped value is the
//! first parameter.
//!
//! Tera rejects a lookup of an undefined variable before any helper sees it.
//! Every `values.*` and `env.*` path the template mentions is therefore given a
//! null leaf when absent, so `valueOrDefault` and missing values behave as they
//! do under handlebars.

use anyhow::Result;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;
use tera::Tera;

use super::{FailureSlot, NamedFunction, RenderContext};
use crate::core::CrustomizeError;

pub(super) fn render(raw: &str, context: &RenderContext) -> Result<String> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);

    let failure = FailureSlot::default();
    for function in context.helpers.iter() {
        tera.register_function(&function.name, as_function(function.clone(), failure.clone()));
        tera.register_filter(&function.name, as_filter(function.clone(), failure.clone()));
    }

    let mut data = context.data();
    define_referenced_paths(raw, &mut data);
    let data = tera::Context::from_value(data).map_err(|e| render_error(&e))?;
    tera.render_str(raw, &data).map_err(|e| failure.take().unwrap_or_else(|| render_error(&e)))
}

static CONTEXT_PATH: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(values|env)((?:\.[A-Za-z_][A-Za-z0-9_]*)+)").ok()
});

/// Insert a null for every dotted `values`/`env` path in `raw` that `data` lacks.
///
/// Missing intermediate keys become objects. Existing non-object values are
/// never replaced.
fn define_referenced_paths(raw: &str, data: &mut Value) {
    let Some(pattern) = CONTEXT_PATH.as_ref() else {
        return;
    };

    for captures in pattern.captures_iter(raw) {
        let Some(mut node) = data.get_mut(&captures[1]) else {
            continue;
        };
        let segments: Vec<&str> = captures[2].split('.').skip(1).collect();
        for (i, segment) in segments.iter().enumerate() {
            let Value::Object(map) = node else {
                break;
            };
            let leaf = i + 1 == segments.len();
            node = map.entry(segment.to_string()).or_insert_with(|| {
                if leaf { Value::Null } else { Value::Object(Map::new()) }
            });
        }
    }
}

fn as_function(
    function: NamedFunction,
    failure: FailureSlot,
) -> impl Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync {
    move |named| {
        let args: Vec<Value> =
            function.params.iter().map(|p| named.get(p).cloned().unwrap_or(Value::Null)).collect();
        invoke(&function, &failure, &args)
    }
}

fn as_filter(
    function: NamedFunction,
    failure: FailureSlot,
) -> impl Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync {
    move |piped, named| {
        let mut args = vec![piped.clone()];
        args.extend(
            function.params.iter().skip(1).map(|p| named.get(p).cloned().unwrap_or(Value::Null)),
        );
        invoke(&function, &failure, &args)
    }
}

fn invoke(function: &NamedFunction, failure: &FailureSlot, args: &[Value]) -> tera::Result<Value> {
    function.call(args).map_err(|e| {
        let message = format!("{}: {e}", function.name);
        failure.record(e);
        tera::Error::msg(message)
    })
}

/// Flatten a tera error chain into one line, dropping the one-off template name.
fn render_error(error: &tera::Error) -> anyhow::Error {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(err) = source {
        messages.push(err.to_string());
        source = err.source();
    }
    let reason = messages
        .iter()
        .map(|m| m.replace("'__tera_one_off'", "template"))
        .filter(|m| !m.trim().is_empty())
        .collect::<Vec<_>>()
        .join(": ");

    CrustomizeError::TemplateRenderError {
        engine: "tera".to_string(),
        reason,
    }
    .into()
}
