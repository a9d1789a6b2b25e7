//! JSON Schema validation of manifests and manifest values.
//!
//! Every violation the validator reports is collected, not just the first, and
//! mapped to a [`Violation`] with a slash-delimited path and a [`ConstraintKind`].

use anyhow::Result;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use std::sync::LazyLock;

use crate::core::{ConstraintKind, CrustomizeError, ValidationTarget, Violation};

const MANIFEST_SCHEMA: &str = include_str!("schema.json");

static MANIFEST_SCHEMA_VALUE: LazyLock<Result<Value, String>> =
    LazyLock::new(|| serde_json::from_str(MANIFEST_SCHEMA).map_err(|e| e.to_string()));

/// Validate an expanded manifest document against the built-in manifest schema.
pub fn validate_manifest(doc: &Value) -> Result<()> {
    let schema = MANIFEST_SCHEMA_VALUE.as_ref().map_err(|e| CrustomizeError::Other {
        message: format!("Built-in manifest schema is invalid: {e}"),
    })?;
    validate(schema, doc, ValidationTarget::Manifest)
}

/// Validate `values` against a user-supplied values schema.
pub fn validate_values(schema: &Value, values: &Value) -> Result<()> {
    validate(schema, values, ValidationTarget::Values)
}

fn validate(schema: &Value, instance: &Value, target: ValidationTarget) -> Result<()> {
    let validator = jsonschema::validator_for(schema).map_err(|e| CrustomizeError::Other {
        message: format!("Invalid {target} schema: {e}"),
    })?;

    let mut violations = Vec::new();
    for error in validator.iter_errors(instance) {
        let path = error.instance_path.to_string();
        let actual = error.instance.to_string();
        match &error.kind {
            ValidationErrorKind::Required {
                property,
            } => {
                let key = property.as_str().map_or_else(|| property.to_string(), str::to_string);
                violations.push(Violation {
                    path: format!("{path}/{key}"),
                    constraint: ConstraintKind::Required,
                    expected: format!("required key '{key}'"),
                    actual: "nothing".to_string(),
                });
            }
            ValidationErrorKind::AdditionalProperties {
                unexpected,
            } => {
                for key in unexpected {
                    violations.push(Violation {
                        path: format!("{path}/{key}"),
                        constraint: ConstraintKind::UnknownKey,
                        expected: "no such key".to_string(),
                        actual: format!("'{key}'"),
                    });
                }
            }
            ValidationErrorKind::Type {
                ..
            } => violations.push(Violation {
                path,
                constraint: ConstraintKind::Type,
                expected: error.to_string(),
                actual,
            }),
            ValidationErrorKind::Enum {
                options,
            } => violations.push(Violation {
                path,
                constraint: ConstraintKind::Enum,
                expected: format!("one of {options}"),
                actual,
            }),
            ValidationErrorKind::Pattern {
                pattern,
            } => violations.push(Violation {
                path,
                constraint: ConstraintKind::Pattern,
                expected: format!("match /{pattern}/"),
                actual,
            }),
            _ => violations.push(Violation {
                path,
                constraint: ConstraintKind::Other,
                expected: error.to_string(),
                actual,
            }),
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        tracing::debug!("{} validation found {} violation(s)", target, violations.len());
        Err(CrustomizeError::ValidationError {
            target,
            violations,
        }
        .into())
    }
}
