//! Document source resolution
//!
//! A [`Location`] is either a local path (resolved against the manifest directory)
//! or an object-store prefix (`s3://bucket/prefix`). Listing returns raw document
//! text in a fixed order: lexicographic by name, so that merging base documents
//! never depends on directory iteration order.
//!
//! Overlays are resolved one file at a time with [`fetch_overlay`]; an overlay that
//! does not resolve to a file is skipped rather than reported.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::aws::AwsCli;
use crate::constants::{DOCUMENT_EXTENSIONS, OBJECT_STORE_SCHEME};
use crate::core::{CrustomizeError, FileOperation, FileOps, FileResultExt};

/// Where a set of documents lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A local file or directory
    Local(PathBuf),
    /// An object-store prefix
    ObjectStore {
        /// Bucket name
        bucket: String,
        /// Key prefix, possibly empty
        prefix: String,
    },
}

impl Location {
    /// Parse `raw`, resolving relative local paths against `relative_to`.
    pub fn parse(raw: &str, relative_to: &Path) -> Self {
        if let Some(rest) = raw.strip_prefix(OBJECT_STORE_SCHEME) {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            return Location::ObjectStore {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            };
        }
        let path = Path::new(raw);
        if path.is_absolute() {
            Location::Local(path.to_path_buf())
        } else {
            Location::Local(relative_to.join(path))
        }
    }

    /// The local path, if this is a local location.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Location::Local(path) => Some(path),
            Location::ObjectStore {
                ..
            } => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::ObjectStore {
                bucket,
                prefix,
            } => write!(f, "{OBJECT_STORE_SCHEME}{bucket}/{prefix}"),
        }
    }
}

/// Raw text of one document, plus the directory its helpers resolve files against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name or object key
    pub name: String,
    /// Unrendered text
    pub text: String,
    /// Working directory for `getFile`/`fileToBase64`
    pub working_dir: PathBuf,
}

/// Whether `name` carries one of the recognised document extensions.
pub fn is_document_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
}

/// Lists documents from a base location.
///
/// `fallback_dir` is the working directory given to remote documents, which have
/// no directory of their own.
pub async fn list_documents(
    location: &Location,
    aws: &AwsCli,
    fallback_dir: &Path,
) -> Result<Vec<Document>> {
    match location {
        Location::Local(dir) => list_local(dir).await,
        Location::ObjectStore {
            bucket,
            prefix,
        } => list_remote(aws.clone(), bucket.clone(), prefix.clone(), fallback_dir).await,
    }
}

async fn list_local(dir: &Path) -> Result<Vec<Document>> {
    let is_dir = FileOps::metadata_if_exists(dir, "resolving base location")
        .await?
        .is_some_and(|m| m.is_dir());
    if !is_dir {
        return Err(CrustomizeError::SourceNotFound {
            location: dir.display().to_string(),
        }
        .into());
    }

    let mut entries = tokio::fs::read_dir(dir).await.with_file_context(
        FileOperation::ListDir,
        dir,
        "listing base documents",
    )?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.with_file_context(
        FileOperation::ListDir,
        dir,
        "listing base documents",
    )? {
        let file_type = entry.file_type().await?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_file() && is_document_name(&name) {
            files.push((name, entry.path()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = Vec::with_capacity(files.len());
    for (name, path) in files {
        let text = FileOps::read_with_context(&path, "reading base document").await?;
        tracing::debug!("Listed base document {}", path.display());
        documents.push(Document {
            name,
            text,
            working_dir: dir.to_path_buf(),
        });
    }
    Ok(documents)
}

async fn list_remote(
    aws: AwsCli,
    bucket: String,
    prefix: String,
    fallback_dir: &Path,
) -> Result<Vec<Document>> {
    let working_dir = fallback_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let keys = aws.list_objects(&bucket, &prefix)?;
        let mut documents = Vec::new();
        for key in keys.into_iter().filter(|k| is_document_name(k)) {
            let text = aws.get_object(&bucket, &key)?;
            tracing::debug!("Fetched base document s3://{}/{}", bucket, key);
            documents.push(Document {
                name: key,
                text,
                working_dir: working_dir.clone(),
            });
        }
        Ok(documents)
    })
    .await
    .context("Object listing task panicked")?
}

/// Fetch a single overlay, or `None` when it does not resolve to a file.
pub async fn fetch_overlay(
    location: &Location,
    aws: &AwsCli,
    fallback_dir: &Path,
) -> Result<Option<Document>> {
    match location {
        Location::Local(path) => {
            let is_file = FileOps::metadata_if_exists(path, "resolving overlay")
                .await?
                .is_some_and(|m| m.is_file());
            if !is_file {
                return Ok(None);
            }
            let text = FileOps::read_with_context(path, "reading overlay").await?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            let working_dir =
                path.parent().map_or_else(|| fallback_dir.to_path_buf(), Path::to_path_buf);
            Ok(Some(Document {
                name,
                text,
                working_dir,
            }))
        }
        Location::ObjectStore {
            bucket,
            prefix,
        } => {
            let (aws, bucket, key) = (aws.clone(), bucket.clone(), prefix.clone());
            let working_dir = fallback_dir.to_path_buf();
            tokio::task::spawn_blocking(move || {
                let exists = aws.list_objects(&bucket, &key)?.iter().any(|k| *k == key);
                if !exists {
                    return Ok(None);
                }
                let text = aws.get_object(&bucket, &key)?;
                Ok(Some(Document {
                    name: key,
                    text,
                    working_dir,
                }))
            })
            .await
            .context("Overlay fetch task panicked")?
        }
    }
}
