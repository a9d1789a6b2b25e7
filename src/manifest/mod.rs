//! Manifest loading and validation
//!
//! A crustomize directory holds a `crustomize.yml` describing how to assemble one
//! template:
//!
//! ```yaml
//! vars:
//!   env: dev
//! base: ./base
//! overlays:
//!   - ./overlays/${env}.yml
//!   - file: ./overlays/tags.yml
//!     arrayMerge: replace
//! params: ./params.yml
//! render: handlebars
//! stack:
//!   name: app-${env}
//!   capabilities: [CAPABILITY_IAM]
//! values:
//!   name: bucket1
//! patches:
//!   - op: remove
//!     path: /Outputs
//! ```
//!
//! Loading runs, in order:
//! 1. path normalization (directory, trailing-slash directory or the file itself)
//! 2. parsing
//! 3. `${var}` expansion against `vars`, which is then dropped
//! 4. schema validation ([`validation::validate_manifest`])
//! 5. values validation, when `values.schema.json` sits beside the local base
//!    directory
//!
//! Manifests are immutable once loaded and are shared through [`ManifestCache`].

pub mod cache;
pub mod validation;
pub mod vars;

pub use cache::ManifestCache;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cfn;
use crate::constants::{MANIFEST_FILE_NAME, VALUES_SCHEMA_FILE_NAME};
use crate::core::{CrustomizeError, FileOps};
use crate::merge::{ArrayMerge, PatchOp};
use crate::source::Location;

/// A validated manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Base document location
    pub base: String,
    /// Overlays, applied in order
    #[serde(default)]
    pub overlays: Vec<OverlayRef>,
    /// Params document location
    #[serde(default)]
    pub params: Option<String>,
    /// Rendering engine name; overrides the command line
    #[serde(default)]
    pub render: Option<String>,
    /// Cloud client profile; overrides the command line
    #[serde(default)]
    pub profile: Option<String>,
    /// Stack settings for the deploying commands
    #[serde(default)]
    pub stack: Option<StackSpec>,
    /// Template values
    pub values: Value,
    /// JSON Patch operations applied after merging
    #[serde(default)]
    pub patches: Vec<PatchOp>,
    /// Directory containing the manifest file
    #[serde(skip)]
    pub dir: PathBuf,
}

/// An overlay as written: a bare location or a location with a merge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverlayRef {
    /// Bare location, arrays append
    Path(String),
    /// Location with an explicit policy
    Entry(OverlayEntry),
}

/// A normalized overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayEntry {
    /// Overlay location
    pub file: String,
    /// Array merge policy
    #[serde(rename = "arrayMerge", default)]
    pub array_merge: ArrayMerge,
}

impl OverlayRef {
    /// Normalize to an [`OverlayEntry`]. Bare strings always mean `append`.
    pub fn normalize(&self) -> OverlayEntry {
        match self {
            OverlayRef::Path(file) => OverlayEntry {
                file: file.clone(),
                array_merge: ArrayMerge::Append,
            },
            OverlayRef::Entry(entry) => entry.clone(),
        }
    }
}

/// Stack settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSpec {
    /// Stack name
    pub name: String,
    /// Capabilities to acknowledge
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Stack tags
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

impl StackSpec {
    /// Tags as `(key, value)` strings, in key order.
    pub fn tag_pairs(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(k, v)| {
                let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                (k.clone(), v)
            })
            .collect()
    }
}

impl Manifest {
    /// Resolved base location.
    pub fn base_location(&self) -> Location {
        Location::parse(&self.base, &self.dir)
    }

    /// Resolved params location, if declared.
    pub fn params_location(&self) -> Option<Location> {
        self.params.as_deref().map(|p| Location::parse(p, &self.dir))
    }

    /// Normalized overlays in manifest order.
    pub fn overlay_entries(&self) -> Vec<OverlayEntry> {
        self.overlays.iter().map(OverlayRef::normalize).collect()
    }
}

/// Canonical manifest file for `path`.
pub(crate) async fn manifest_file_path(path: &Path) -> PathBuf {
    if path.file_name().is_some_and(|n| n == MANIFEST_FILE_NAME) {
        return path.to_path_buf();
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => path.to_path_buf(),
        _ => path.join(MANIFEST_FILE_NAME),
    }
}

pub(crate) async fn load_uncached(file: &Path) -> Result<Manifest> {
    let text = match tokio::fs::read_to_string(file).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CrustomizeError::ManifestNotFound {
                path: file.display().to_string(),
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let parse_error = |reason: String| CrustomizeError::ManifestParseError {
        file: file.display().to_string(),
        reason,
    };

    let mut doc = cfn::parse_yaml(&text).map_err(|e| parse_error(e.to_string()))?;
    vars::expand_vars(&mut doc);
    validation::validate_manifest(&doc)?;

    let mut manifest: Manifest =
        serde_json::from_value(doc).map_err(|e| parse_error(e.to_string()))?;
    manifest.dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

    if let Some(base_dir) = manifest.base_location().as_local() {
        validate_values_schema(base_dir, &manifest.values).await?;
    }

    tracing::debug!("Loaded manifest {}", file.display());
    Ok(manifest)
}

async fn validate_values_schema(base_dir: &Path, values: &Value) -> Result<()> {
    let Some(parent) = base_dir.parent() else {
        return Ok(());
    };
    let schema_path = parent.join(VALUES_SCHEMA_FILE_NAME);
    if FileOps::metadata_if_exists(&schema_path, "locating values schema").await?.is_none() {
        return Ok(());
    }
    let text = FileOps::read_with_context(&schema_path, "reading values schema").await?;
    let schema: Value = serde_json::from_str(&text).map_err(|e| CrustomizeError::ManifestParseError {
        file: schema_path.display().to_string(),
        reason: e.to_string(),
    })?;
    tracing::debug!("Validating values against {}", schema_path.display());
    validation::validate_values(&schema, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValidationTarget;
    use serde_json::json;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_overlay_normalization() {
        let bare = OverlayRef::Path("./Template.yml".to_string());
        assert_eq!(
            bare.normalize(),
            OverlayEntry {
                file: "./Template.yml".to_string(),
                array_merge: ArrayMerge::Append,
            }
        );

        let parsed: Vec<OverlayRef> = serde_json::from_value(json!([
            "a.yml",
            {"file": "b.yml", "arrayMerge": "replace"},
            {"file": "c.yml"}
        ]))
        .unwrap();
        let policies: Vec<ArrayMerge> = parsed.iter().map(|o| o.normalize().array_merge).collect();
        assert_eq!(policies, [ArrayMerge::Append, ArrayMerge::Replace, ArrayMerge::Append]);
    }

    #[tokio::test]
    async fn test_load_accepts_dir_trailing_slash_and_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "crustomize.yml", "base: ./base\nvalues: {}\n");

        let as_dir = ManifestCache::new().load(dir.path()).await?;
        let slash = format!("{}/", dir.path().display());
        let as_slash = ManifestCache::new().load(&slash).await?;
        let as_file = ManifestCache::new().load(dir.path().join("crustomize.yml")).await?;

        assert_eq!(as_dir, as_slash);
        assert_eq!(as_dir, as_file);
        assert_eq!(as_dir.dir, std::fs::canonicalize(dir.path())?);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestCache::new().load(dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrustomizeError>(),
            Some(CrustomizeError::ManifestNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_vars_expand_before_validation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(
            dir.path(),
            "crustomize.yml",
            "vars:\n  env: dev\nbase: ./base-${env}\nstack:\n  name: app-${env}\nvalues:\n  bucket: b-${env}\n",
        );
        let manifest = ManifestCache::new().load(dir.path()).await?;
        assert_eq!(manifest.base, "./base-dev");
        assert_eq!(manifest.stack.as_ref().unwrap().name, "app-dev");
        assert_eq!(manifest.values, json!({"bucket": "b-dev"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_returns_same_manifest_without_rereading() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "crustomize.yml", "base: ./base\nvalues: {a: 1}\n");
        let cache = ManifestCache::new();

        let first = cache.load(dir.path()).await?;
        write(dir.path(), "crustomize.yml", "base: ./other\nvalues: {a: 2}\n");
        let second = cache.load(dir.path().join("crustomize.yml")).await?;

        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert_eq!(second.base, "./base");
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_values_schema_beside_base() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "base/a.yml", "A: 1\n");
        write(
            dir.path(),
            "values.schema.json",
            r#"{"type": "object", "required": ["name"]}"#,
        );
        write(dir.path(), "crustomize.yml", "base: ./base\nvalues:\n  other: 1\n");

        let err = ManifestCache::new().load(dir.path()).await.unwrap_err();
        match err.downcast_ref::<CrustomizeError>() {
            Some(CrustomizeError::ValidationError {
                target,
                violations,
            }) => {
                assert_eq!(*target, ValidationTarget::Values);
                assert_eq!(violations[0].path, "/name");
            }
            other => panic!("expected values ValidationError, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_manifest_reports_violations() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "crustomize.yml", "base: ./base\nvalues: {}\noverlay: []\n");
        let err = ManifestCache::new().load(dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrustomizeError>(),
            Some(CrustomizeError::ValidationError { target: ValidationTarget::Manifest, .. })
        ));
    }

    #[test]
    fn test_stack_tag_pairs() {
        let stack: StackSpec =
            serde_json::from_value(json!({"name": "s", "tags": {"Team": "core", "Cost": 12}}))
                .unwrap();
        assert_eq!(
            stack.tag_pairs(),
            [("Cost".to_string(), "12".to_string()), ("Team".to_string(), "core".to_string())]
        );
    }
}
