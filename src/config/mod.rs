//! Run defaults from `.crustomizerc`
//!
//! A `.crustomizerc` is a YAML map of command-line defaults:
//!
//! ```yaml
//! render: tera
//! profile: dev
//! env: ./env/dev.yml
//! helpers: ./crustomize_helpers
//! hooks: ./crustomize_hooks
//! output: ./build
//! lint: true
//! ci: false
//! ```
//!
//! # Lookup
//!
//! - `--config <path>`: only that file, which must exist
//! - otherwise `~/.crustomizerc`, then `./.crustomizerc`; keys in the local file
//!   override the global one
//!
//! A value from the config only fills an option the command line left unset.
//! `render` and `profile` in a manifest override both.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants::CONFIG_FILE_NAME;
use crate::core::{CrustomizeError, FileOps};

/// Defaults read from `.crustomizerc` files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Template engine
    #[serde(default)]
    pub render: Option<String>,
    /// Cloud client profile
    #[serde(default)]
    pub profile: Option<String>,
    /// Env override file
    #[serde(default)]
    pub env: Option<PathBuf>,
    /// Custom helper definition sources
    #[serde(default)]
    pub helpers: Option<String>,
    /// Hook definition sources
    #[serde(default)]
    pub hooks: Option<String>,
    /// Artifact output directory
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Run the linter after building
    #[serde(default)]
    pub lint: Option<bool>,
    /// Non-interactive output
    #[serde(default)]
    pub ci: Option<bool>,
}

impl RunConfig {
    /// Load defaults for this run.
    ///
    /// With `explicit`, only that file is read and it must exist. Otherwise the
    /// global and local files are layered; missing files are skipped.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if FileOps::metadata_if_exists(path, "locating config").await?.is_none() {
                return Err(CrustomizeError::ConfigError {
                    message: format!("Config file {} does not exist", path.display()),
                }
                .into());
            }
            return Self::load_from(path).await;
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        Self::load_layered(Self::global_path().as_deref(), &local).await
    }

    /// `global` overridden by `local`, each optional on disk.
    pub async fn load_layered(global: Option<&Path>, local: &Path) -> Result<Self> {
        let mut config = Self::default();
        for path in global.into_iter().chain(std::iter::once(local)) {
            if FileOps::metadata_if_exists(path, "locating config").await?.is_some() {
                config = config.overridden_by(Self::load_from(path).await?);
            }
        }
        Ok(config)
    }

    /// Parse one config file. An empty file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let text = FileOps::read_with_context(path, "reading config").await?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(&text).map_err(|e| CrustomizeError::ConfigError {
            message: format!("Invalid config file {}: {e}", path.display()),
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config.unwrap_or_default())
    }

    /// `~/.crustomizerc`, when a home directory is known.
    pub fn global_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Keys set in `other` replace ours.
    pub fn overridden_by(self, other: Self) -> Self {
        Self {
            render: other.render.or(self.render),
            profile: other.profile.or(self.profile),
            env: other.env.or(self.env),
            helpers: other.helpers.or(self.helpers),
            hooks: other.hooks.or(self.hooks),
            output: other.output.or(self.output),
            lint: other.lint.or(self.lint),
            ci: other.ci.or(self.ci),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_overrides_global() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let global = dir.path().join("global");
        let local = dir.path().join("local");
        std::fs::write(&global, "render: tera\nprofile: shared\nci: true\n")?;
        std::fs::write(&local, "profile: dev\nlint: true\n")?;

        let config = RunConfig::load_layered(Some(&global), &local).await?;
        assert_eq!(config.render.as_deref(), Some("tera"));
        assert_eq!(config.profile.as_deref(), Some("dev"));
        assert_eq!(config.lint, Some(true));
        assert_eq!(config.ci, Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_files_are_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config =
            RunConfig::load_layered(Some(&dir.path().join("a")), &dir.path().join("b")).await?;
        assert_eq!(config, RunConfig::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::load(Some(&dir.path().join("nope"))).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrustomizeError>(),
            Some(CrustomizeError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".crustomizerc");
        std::fs::write(&path, "render: tera\ncolour: blue\n").unwrap();
        let err = RunConfig::load(Some(&path)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrustomizeError>(),
            Some(CrustomizeError::ConfigError { message }) if message.contains("colour")
        ));
    }

    #[tokio::test]
    async fn test_empty_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".crustomizerc");
        std::fs::write(&path, "\n")?;
        assert_eq!(RunConfig::load(Some(&path)).await?, RunConfig::default());
        Ok(())
    }
}
