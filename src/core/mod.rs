//! Core types shared by every stage of the pipeline
//!
//! - [`error`] - the [`CrustomizeError`] taxonomy and CLI error presentation
//! - [`file_error`] - file I/O errors that remember what was being read and why

pub mod error;
pub mod file_error;

pub use error::{
    ConstraintKind, CrustomizeError, ErrorContext, ValidationTarget, Violation,
    user_friendly_error,
};
pub use file_error::{FileOperation, FileOperationError, FileOps, FileResultExt};
