//! Cloud provisioning client adapter.
//!
//! Thin wrapper over the `aws` command line client. Reads (stack outputs,
//! parameters, object listings) are issued synchronously from template helpers
//! and the document source resolver; the deploying calls back the CLI commands.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::CrustomizeError;
use crate::process::{RunOptions, SharedRunner, run_checked};

const AWS: &str = "aws";

/// Stack settings for the deploying commands.
#[derive(Debug, Clone, Default)]
pub struct StackRequest<'a> {
    /// Stack name
    pub name: &'a str,
    /// IAM capabilities to acknowledge
    pub capabilities: &'a [String],
    /// Stack tags, in key order
    pub tags: Vec<(&'a str, &'a str)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    #[serde(default)]
    output_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectListing {
    #[serde(default)]
    contents: Option<Vec<ObjectEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
}

/// `aws` CLI client bound to an optional named profile.
#[derive(Clone)]
pub struct AwsCli {
    runner: SharedRunner,
    profile: Option<String>,
}

impl AwsCli {
    /// Create a client. An empty profile string means "no profile".
    pub fn new(runner: SharedRunner, profile: Option<String>) -> Self {
        Self {
            runner,
            profile: profile.filter(|p| !p.is_empty()),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut args: Vec<String> = args.iter().map(ToString::to_string).collect();
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        run_checked(self.runner.as_ref(), AWS, &args, &RunOptions::default())
    }

    /// Value of output `key` on stack `stack`.
    pub fn lookup_output(&self, stack: &str, key: &str) -> Result<String> {
        let raw = self.run(&[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            stack,
            "--query",
            "Stacks[0].Outputs",
            "--output",
            "json",
        ])?;
        let outputs: Option<Vec<StackOutput>> = serde_json::from_str(raw.trim())
            .with_context(|| format!("Failed to parse outputs of stack {stack}"))?;

        outputs
            .unwrap_or_default()
            .into_iter()
            .find(|o| o.output_key == key)
            .and_then(|o| o.output_value)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CrustomizeError::OutputNotFound {
                    stack: stack.to_string(),
                    key: key.to_string(),
                }
                .into()
            })
    }

    /// Parameter store lookup. `query` defaults to `Parameter.Value`.
    pub fn get_parameter(&self, name: &str, query: Option<&str>) -> Result<String> {
        let query = query.filter(|q| !q.is_empty()).unwrap_or("Parameter.Value");
        let raw = self.run(&[
            "ssm",
            "get-parameter",
            "--name",
            name,
            "--query",
            query,
            "--output",
            "text",
        ])?;
        Ok(raw.trim().to_string())
    }

    /// Keys under `bucket/prefix`, sorted. A missing or empty listing is empty.
    pub fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let raw = self.run(&[
            "s3api",
            "list-objects-v2",
            "--bucket",
            bucket,
            "--prefix",
            prefix,
            "--output",
            "json",
        ])?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let listing: ObjectListing = serde_json::from_str(raw.trim())
            .with_context(|| format!("Failed to parse listing of s3://{bucket}/{prefix}"))?;
        let mut keys: Vec<String> =
            listing.contents.unwrap_or_default().into_iter().map(|o| o.key).collect();
        keys.sort();
        Ok(keys)
    }

    /// Body of one object.
    pub fn get_object(&self, bucket: &str, key: &str) -> Result<String> {
        let uri = format!("s3://{bucket}/{key}");
        self.run(&["s3", "cp", &uri, "-"])
    }

    /// Whether the stack exists.
    pub fn stack_exists(&self, stack: &str) -> bool {
        self.run(&["cloudformation", "describe-stacks", "--stack-name", stack]).is_ok()
    }

    /// Server-side template validation.
    pub fn validate_template(&self, template: &Path) -> Result<String> {
        let body = format!("file://{}", template.display());
        self.run(&["cloudformation", "validate-template", "--template-body", &body])
    }

    /// Deploy a template. Returns `false` when there was nothing to change.
    pub fn deploy(
        &self,
        stack: &StackRequest<'_>,
        template: &Path,
        params: Option<&Path>,
    ) -> Result<bool> {
        let template = template.display().to_string();
        let mut args = vec![
            "cloudformation".to_string(),
            "deploy".to_string(),
            "--stack-name".to_string(),
            stack.name.to_string(),
            "--template-file".to_string(),
            template,
        ];
        if !stack.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(stack.capabilities.iter().cloned());
        }
        if !stack.tags.is_empty() {
            args.push("--tags".to_string());
            args.extend(stack.tags.iter().map(|(k, v)| format!("{k}={v}")));
        }
        if let Some(params) = params {
            args.push("--parameter-overrides".to_string());
            args.extend(parameter_overrides(params)?);
        }

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&refs) {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("No changes to deploy") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a change set named `change_set` and wait until it is ready.
    /// Returns the `describe-change-set` JSON.
    pub fn create_change_set(
        &self,
        stack: &StackRequest<'_>,
        change_set: &str,
        template: &Path,
        params: Option<&Path>,
    ) -> Result<Value> {
        let body = format!("file://{}", template.display());
        let change_set_type = if self.stack_exists(stack.name) {
            "UPDATE"
        } else {
            "CREATE"
        };
        let mut args = vec![
            "cloudformation".to_string(),
            "create-change-set".to_string(),
            "--stack-name".to_string(),
            stack.name.to_string(),
            "--template-body".to_string(),
            body,
        ];
        if !stack.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(stack.capabilities.iter().cloned());
        }
        if !stack.tags.is_empty() {
            args.push("--tags".to_string());
            args.extend(stack.tags.iter().map(|(k, v)| format!("Key={k},Value={v}")));
        }
        if let Some(params) = params {
            args.push("--parameters".to_string());
            args.push(format!("file://{}", params.display()));
        }
        args.extend([
            "--change-set-type".to_string(),
            change_set_type.to_string(),
            "--change-set-name".to_string(),
            change_set.to_string(),
        ]);

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs)?;
        self.run(&[
            "cloudformation",
            "wait",
            "change-set-create-complete",
            "--stack-name",
            stack.name,
            "--change-set-name",
            change_set,
        ])?;
        let described = self.run(&[
            "cloudformation",
            "describe-change-set",
            "--stack-name",
            stack.name,
            "--change-set-name",
            change_set,
            "--output",
            "json",
        ])?;
        serde_json::from_str(described.trim())
            .with_context(|| format!("Failed to parse change set {change_set}"))
    }

    /// Execute a previously created change set.
    pub fn execute_change_set(&self, stack: &str, change_set: &str) -> Result<()> {
        self.run(&[
            "cloudformation",
            "execute-change-set",
            "--stack-name",
            stack,
            "--change-set-name",
            change_set,
            "--output",
            "json",
        ])?;
        Ok(())
    }

    /// Delete a change set.
    pub fn delete_change_set(&self, stack: &str, change_set: &str) -> Result<()> {
        self.run(&[
            "cloudformation",
            "delete-change-set",
            "--stack-name",
            stack,
            "--change-set-name",
            change_set,
            "--output",
            "json",
        ])?;
        Ok(())
    }
}

/// `Key=Value` pairs from a params file.
///
/// Accepts either a flat object or the `[{ParameterKey, ParameterValue}]` list the
/// change set API takes, so one params file serves both commands.
fn parameter_overrides(params: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(params)
        .with_context(|| format!("Failed to read {}", params.display()))?;
    let value: Value = serde_json::from_str(&text)?;
    let pairs = match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| format!("{k}={}", scalar(&v))).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let key = item.get("ParameterKey")?.as_str()?;
                let value = item.get("ParameterValue")?;
                Some(format!("{key}={}", scalar(value)))
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(pairs)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `<stack>-cs-<hash>`, the hash being a SHA-256 prefix of the rendered template.
pub fn change_set_name(stack: &str, template: &str) -> String {
    let digest = hex::encode(Sha256::digest(template.as_bytes()));
    format!("{stack}-cs-{}", &digest[..32])
}
