//! The manifest resolution pipeline.
//!
//! [`Resolver::resolve`] turns a [`Manifest`] into one merged document:
//!
//! 1. every base document, in name order, is rendered, parsed and deep-merged
//!    with arrays appended
//! 2. every overlay, in manifest order, is rendered, parsed and deep-merged with
//!    its own array policy; an overlay that is not a file is skipped
//! 3. the manifest's patches are applied in order
//!
//! [`Resolver::build`] wraps that with manifest loading, custom resource
//! extraction and the params pass, producing a [`BuildOutput`] ready to be
//! printed or written to disk.
//!
//! Stages run one after another; only file, object-store and command I/O
//! suspend. Rendering happens on the blocking pool because helpers may shell
//! out to the cloud client.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aws::AwsCli;
use crate::cfn;
use crate::constants::{CUSTOM_RESOURCE_PREFIX, DEFAULT_ENGINE, PARAMS_OUTPUT_FILE, TEMPLATE_OUTPUT_FILE};
use crate::core::{CrustomizeError, FileOps};
use crate::hooks::{self, CustomResources};
use crate::manifest::{Manifest, ManifestCache};
use crate::merge::{ArrayMerge, apply_patches, deep_merge};
use crate::process::SharedRunner;
use crate::source::{self, Document, Location};
use crate::templating::{self, Engine, HelperEnv, HelperLoader, HelperTable, RenderContext};

/// Settings that apply to every manifest a [`Resolver`] handles.
///
/// `render` and `profile` are defaults; a manifest that sets either wins.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Engine name
    pub render: Option<String>,
    /// Cloud client profile
    pub profile: Option<String>,
    /// YAML file of environment overrides
    pub env_file: Option<PathBuf>,
    /// Custom helper definition sources
    pub helpers: Option<String>,
}

/// Runs the pipeline. One per process run; it owns the manifest cache and the
/// custom helper loader.
pub struct Resolver {
    cache: Arc<ManifestCache>,
    runner: SharedRunner,
    helpers: Arc<HelperLoader>,
    options: ResolveOptions,
    prefix: String,
}

/// Result of [`Resolver::build`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The manifest that was built
    pub manifest: Arc<Manifest>,
    /// Merged document without custom resources
    pub template: Value,
    /// Extracted custom resources
    pub custom_resources: CustomResources,
    /// Rendered params, when the manifest declares them
    pub params: Option<Value>,
}

/// Files written by [`BuildOutput::write_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// The merged template
    pub template: PathBuf,
    /// The params file
    pub params: Option<PathBuf>,
}

impl Resolver {
    /// Resolver with an empty manifest cache.
    pub fn new(runner: SharedRunner, options: ResolveOptions) -> Self {
        Self {
            cache: Arc::new(ManifestCache::new()),
            helpers: Arc::new(HelperLoader::new(options.helpers.clone())),
            runner,
            options,
            prefix: CUSTOM_RESOURCE_PREFIX.to_string(),
        }
    }

    /// Share an existing manifest cache.
    pub fn with_cache(mut self, cache: Arc<ManifestCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Route resources whose type starts with `prefix` to hooks.
    pub fn with_custom_resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// The manifest cache.
    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    /// Engine for `manifest`: its own `render`, else the option, else handlebars.
    pub fn engine_for(&self, manifest: &Manifest) -> Result<Engine> {
        let name = manifest
            .render
            .as_deref()
            .or(self.options.render.as_deref())
            .unwrap_or(DEFAULT_ENGINE);
        Ok(name.parse()?)
    }

    /// Profile for `manifest`: its own `profile`, else the option.
    pub fn profile_for(&self, manifest: &Manifest) -> Option<String> {
        manifest.profile.clone().or_else(|| self.options.profile.clone())
    }

    /// Cloud client for `manifest`.
    pub fn aws_for(&self, manifest: &Manifest) -> AwsCli {
        AwsCli::new(self.runner.clone(), self.profile_for(manifest))
    }

    /// Merge base documents, then overlays, then apply patches.
    pub async fn resolve(&self, manifest: &Manifest) -> Result<Value> {
        let engine = self.engine_for(manifest)?;
        let env = templating::load_env(self.options.env_file.as_deref()).await?;
        let aws = self.aws_for(manifest);

        let base = manifest.base_location();
        let mut merged = Value::Object(Map::new());
        let documents = source::list_documents(&base, &aws, &manifest.dir).await?;
        tracing::info!("Merging {} base document(s) from {}", documents.len(), base);
        for document in documents {
            let parsed = self.render_document(document, manifest, &env, engine).await?;
            deep_merge(&mut merged, parsed, ArrayMerge::Append);
        }

        for overlay in manifest.overlay_entries() {
            let location = Location::parse(&overlay.file, &manifest.dir);
            let Some(document) = source::fetch_overlay(&location, &aws, &manifest.dir).await? else {
                tracing::warn!("Skipping overlay {}: not a file", location);
                continue;
            };
            tracing::debug!("Merging overlay {} ({})", location, overlay.array_merge);
            let parsed = self.render_document(document, manifest, &env, engine).await?;
            deep_merge(&mut merged, parsed, overlay.array_merge);
        }

        if !manifest.patches.is_empty() {
            tracing::debug!("Applying {} patch(es)", manifest.patches.len());
            apply_patches(&mut merged, &manifest.patches)?;
        }
        Ok(merged)
    }

    /// Render and parse the params document, if the manifest declares one.
    ///
    /// The params document sees the manifest values and resolves files against
    /// the manifest directory.
    pub async fn render_params(&self, manifest: &Manifest) -> Result<Option<Value>> {
        let Some(location) = manifest.params_location() else {
            return Ok(None);
        };
        let engine = self.engine_for(manifest)?;
        let env = templating::load_env(self.options.env_file.as_deref()).await?;
        let aws = self.aws_for(manifest);

        let mut document = source::fetch_overlay(&location, &aws, &manifest.dir)
            .await?
            .ok_or_else(|| CrustomizeError::SourceNotFound {
                location: location.to_string(),
            })?;
        document.working_dir = manifest.dir.clone();
        let params = self.render_document(document, manifest, &env, engine).await?;
        Ok(Some(params))
    }

    /// Load the manifest at `path` and run the whole pipeline.
    pub async fn build(&self, path: impl AsRef<Path>) -> Result<BuildOutput> {
        let manifest = self.cache.load(path).await?;
        let merged = self.resolve(&manifest).await?;
        let (template, custom_resources) = hooks::extract(merged, &self.prefix);
        if !custom_resources.is_empty() {
            tracing::info!("Extracted {} custom resource(s)", custom_resources.len());
        }
        let params = self.render_params(&manifest).await?;
        Ok(BuildOutput {
            manifest,
            template,
            custom_resources,
            params,
        })
    }

    async fn render_document(
        &self,
        document: Document,
        manifest: &Manifest,
        env: &BTreeMap<String, String>,
        engine: Engine,
    ) -> Result<Value> {
        let helper_env =
            HelperEnv::new(document.working_dir.clone(), self.profile_for(manifest), self.runner.clone());
        let loader = self.helpers.clone();
        let values = manifest.values.clone();
        let env = env.clone();
        let Document {
            name,
            text,
            ..
        } = document;

        tracing::debug!("Rendering {} with {}", name, engine);
        let rendered = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut helpers = HelperTable::with_builtins(&helper_env);
            loader.register_into(&mut helpers, &helper_env)?;
            let context = RenderContext::new(values, env, helpers);
            templating::render_with(&text, &context, engine)
        })
        .await
        .context("Render task panicked")?
        .with_context(|| format!("Failed to render {name}"))?;

        cfn::parse_document(&name, &rendered)
    }
}

impl BuildOutput {
    /// The template as YAML.
    pub fn template_yaml(&self) -> Result<String> {
        cfn::to_yaml_string(&self.template)
    }

    /// The params as pretty JSON.
    pub fn params_json(&self) -> Result<Option<String>> {
        match &self.params {
            Some(params) => Ok(Some(serde_json::to_string_pretty(params)?)),
            None => Ok(None),
        }
    }

    /// Write `template.yml` (and `params.json`) into `dir`, creating it if needed.
    pub async fn write_to(&self, dir: &Path) -> Result<Artifacts> {
        if let Some(meta) = FileOps::metadata_if_exists(dir, "checking output directory").await? {
            if !meta.is_dir() {
                return Err(CrustomizeError::Other {
                    message: format!("Output path {} is not a directory", dir.display()),
                }
                .into());
            }
        }

        let template = dir.join(TEMPLATE_OUTPUT_FILE);
        FileOps::write_with_context(&template, &self.template_yaml()?, "writing template").await?;

        let params = match self.params_json()? {
            Some(json) => {
                let path = dir.join(PARAMS_OUTPUT_FILE);
                FileOps::write_with_context(&path, &json, "writing params").await?;
                Some(path)
            }
            None => None,
        };

        tracing::info!("Wrote artifacts to {}", dir.display());
        Ok(Artifacts {
            template,
            params,
        })
    }
}
