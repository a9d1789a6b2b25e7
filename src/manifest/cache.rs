//! Process-lifetime cache of loaded manifests.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{Manifest, load_uncached, manifest_file_path};
use crate::core::CrustomizeError;

/// Loaded manifests keyed by canonical file path.
///
/// Create one per process run and share it by reference. Entries are never
/// evicted; a second load of the same path returns the first result without
/// touching the file system again. Two racing loads of the same path may both
/// read the file, and the first insert wins.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: RwLock<HashMap<PathBuf, Arc<Manifest>>>,
}

impl ManifestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load, expand and validate the manifest at `path`, or return the cached copy.
    ///
    /// `path` may be a directory (with or without a trailing slash) or the manifest
    /// file itself.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Manifest>> {
        let file = manifest_file_path(path.as_ref()).await;
        let key = match tokio::fs::canonicalize(&file).await {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CrustomizeError::ManifestNotFound {
                    path: file.display().to_string(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(hit) = self.get(&key) {
            tracing::debug!("Manifest cache hit for {}", key.display());
            return Ok(hit);
        }

        let manifest = Arc::new(load_uncached(&key).await?);
        let mut entries = self.entries.write().map_err(|_| CrustomizeError::Other {
            message: "manifest cache lock poisoned".to_string(),
        })?;
        Ok(entries.entry(key).or_insert(manifest).clone())
    }

    fn get(&self, key: &Path) -> Option<Arc<Manifest>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Number of cached manifests.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
