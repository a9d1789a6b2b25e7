//! CloudFormation-aware document parsing and serialization.
//!
//! Documents are YAML (JSON is a subset) parsed into [`serde_json::Value`] so the
//! merge, patch and templating layers all work on one tree type. Short-form
//! intrinsic tags such as `!Ref` or `!Sub` have no JSON equivalent, so they are
//! mapped to their long form on the way in and folded back on the way out.

use anyhow::Result;
use serde_json::{Map, Value};
use serde_yaml::value::{Tag, TaggedValue};

use crate::core::CrustomizeError;

/// Intrinsics emitted back in short form. Anything else stays in long form.
const SHORT_FORM_FUNCTIONS: &[&str] = &[
    "And",
    "Base64",
    "Cidr",
    "Equals",
    "FindInMap",
    "GetAtt",
    "GetAZs",
    "If",
    "ImportValue",
    "Join",
    "Not",
    "Or",
    "Select",
    "Split",
    "Sub",
    "Transform",
];

/// Parse one rendered document. Empty or whitespace-only text is an empty map.
pub fn parse_document(name: &str, text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| CrustomizeError::DocumentParseError {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(match yaml_to_json(yaml) {
        Value::Null => Value::Object(Map::new()),
        value => value,
    })
}

/// Parse YAML text with no document name attached (manifests, env files).
pub fn parse_yaml(text: &str) -> Result<Value, serde_yaml::Error> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    Ok(yaml_to_json(yaml))
}

/// Serialize a merged document back to YAML, restoring short-form tags.
pub fn to_yaml_string(value: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(&json_to_yaml(value))?)
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => expand_tag(*tagged),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(n.to_string()), Value::Number)
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other).map(|s| s.trim_end().to_string()).unwrap_or_default(),
    }
}

fn expand_tag(tagged: TaggedValue) -> Value {
    let tag = tagged.tag.to_string();
    let name = tag.trim_start_matches('!');
    let inner = yaml_to_json(tagged.value);

    let (key, value) = match name {
        "Ref" | "Condition" => (name.to_string(), inner),
        "GetAtt" => {
            let value = match inner {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => Value::Array(vec![
                        Value::String(resource.to_string()),
                        Value::String(attribute.to_string()),
                    ]),
                    None => Value::String(s),
                },
                other => other,
            };
            ("Fn::GetAtt".to_string(), value)
        }
        _ => (format!("Fn::{name}"), inner),
    };

    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

fn json_to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => json_number(n),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(items) => serde_yaml::Value::Sequence(items.iter().map(json_to_yaml).collect()),
        Value::Object(map) => {
            if let Some(tagged) = fold_tag(map) {
                return tagged;
            }
            let mut mapping = serde_yaml::Mapping::with_capacity(map.len());
            for (key, value) in map {
                mapping.insert(serde_yaml::Value::String(key.clone()), json_to_yaml(value));
            }
            serde_yaml::Value::Mapping(mapping)
        }
    }
}

fn json_number(n: &serde_json::Number) -> serde_yaml::Value {
    if let Some(i) = n.as_i64() {
        serde_yaml::Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        serde_yaml::Value::Number(u.into())
    } else {
        serde_yaml::Value::Number(n.as_f64().unwrap_or_default().into())
    }
}

fn fold_tag(map: &Map<String, Value>) -> Option<serde_yaml::Value> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;

    let name = match key.as_str() {
        "Ref" | "Condition" if value.is_string() => key.as_str(),
        _ => key.strip_prefix("Fn::").filter(|f| SHORT_FORM_FUNCTIONS.contains(f))?,
    };

    let inner = match (name, value) {
        ("GetAtt", Value::Array(parts)) if parts.len() == 2 && parts.iter().all(Value::is_string) => {
            let joined: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            serde_yaml::Value::String(joined.join("."))
        }
        _ => json_to_yaml(value),
    };

    Some(serde_yaml::Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new(name),
        value: inner,
    })))
}
