//! File system errors with operation context
//!
//! Wraps [`std::io::Error`] with what the pipeline was doing at the time (reading a
//! base document, an env file, a helper definition) so messages point at the
//! offending input without re-running in verbose mode.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Types of file operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    /// Reading a file completely
    Read,
    /// Writing a file
    Write,
    /// Listing a directory
    ListDir,
    /// Getting file metadata
    Metadata,
    /// Creating a directory
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::ListDir => write!(f, "listing"),
            FileOperation::Metadata => write!(f, "getting metadata for"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

/// An I/O failure together with the operation, path and purpose.
#[derive(Error, Debug)]
#[error("Failed {operation} '{}' for {purpose}: {source}", file_path.display())]
pub struct FileOperationError {
    /// The type of operation that failed
    pub operation: FileOperation,
    /// The file path that was being accessed
    pub file_path: PathBuf,
    /// Why the file was being accessed
    pub purpose: String,
    /// The underlying IO error
    #[source]
    pub source: std::io::Error,
}

impl FileOperationError {
    /// True when the underlying error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }
}

/// Extension trait for Result types to add file operation context
pub trait FileResultExt<T> {
    /// Add file operation context to a Result
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError>;
}

impl<T> FileResultExt<T> for Result<T, std::io::Error> {
    fn with_file_context(
        self,
        operation: FileOperation,
        file_path: impl Into<PathBuf>,
        purpose: impl Into<String>,
    ) -> Result<T, FileOperationError> {
        self.map_err(|source| FileOperationError {
            operation,
            file_path: file_path.into(),
            purpose: purpose.into(),
            source,
        })
    }
}

/// Convenience functions for common file operations with context
pub struct FileOps;

impl FileOps {
    /// Read a UTF-8 file with context
    pub async fn read_with_context(
        path: &Path,
        purpose: &str,
    ) -> Result<String, FileOperationError> {
        tokio::fs::read_to_string(path).await.with_file_context(FileOperation::Read, path, purpose)
    }

    /// Write a file, creating parent directories as needed
    pub async fn write_with_context(
        path: &Path,
        contents: &str,
        purpose: &str,
    ) -> Result<(), FileOperationError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_file_context(
                FileOperation::CreateDir,
                parent,
                purpose,
            )?;
        }
        tokio::fs::write(path, contents).await.with_file_context(
            FileOperation::Write,
            path,
            purpose,
        )
    }

    /// `Some(metadata)` if the path exists, `None` if it does not
    pub async fn metadata_if_exists(
        path: &Path,
        purpose: &str,
    ) -> Result<Option<std::fs::Metadata>, FileOperationError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_file_context(FileOperation::Metadata, path, purpose),
        }
    }
}
