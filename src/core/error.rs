//! Error handling for crustomize
//!
//! Two layers, as everywhere in the crate:
//! - [`CrustomizeError`] - strongly-typed failures raised by the pipeline
//! - [`ErrorContext`] - a user-facing wrapper adding details and a suggestion
//!
//! Library functions return [`anyhow::Result`]; the typed error travels inside the
//! `anyhow::Error` and is recovered with `downcast_ref::<CrustomizeError>()`.
//! [`user_friendly_error`] is what the binary calls before exiting.
//!
//! # Examples
//!
//! ```rust,no_run
//! use crustomize::core::{CrustomizeError, user_friendly_error};
//!
//! let err = anyhow::Error::from(CrustomizeError::UnsupportedEngine {
//!     engine: "ejs".to_string(),
//! });
//! let ctx = user_friendly_error(err);
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Which document a [`CrustomizeError::ValidationError`] was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTarget {
    /// The manifest file itself
    Manifest,
    /// The manifest's `values` checked against the values schema file
    Values,
}

impl fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationTarget::Manifest => write!(f, "manifest"),
            ValidationTarget::Values => write!(f, "values"),
        }
    }
}

/// The kind of schema constraint a [`Violation`] broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Value has the wrong type
    Type,
    /// A required key is absent
    Required,
    /// A key not allowed by the schema is present
    UnknownKey,
    /// Value is not one of the allowed options
    Enum,
    /// String does not match the required pattern
    Pattern,
    /// Any other schema keyword
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Type => "type mismatch",
            ConstraintKind::Required => "missing required key",
            ConstraintKind::UnknownKey => "unknown key",
            ConstraintKind::Enum => "enum violation",
            ConstraintKind::Pattern => "pattern violation",
            ConstraintKind::Other => "constraint violation",
        };
        f.write_str(name)
    }
}

/// A single schema violation, located by a slash-delimited path.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Slash-delimited location, array indices included (e.g. `/overlays/1/arrayMerge`)
    pub path: String,
    /// Constraint kind that failed
    pub constraint: ConstraintKind,
    /// What the schema expected
    pub expected: String,
    /// What was found, rendered as JSON
    pub actual: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "/"
        } else {
            &self.path
        };
        write!(f, "{path}: {} (expected {}, found {})", self.constraint, self.expected, self.actual)
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("\n  - {v}")).collect()
}

/// The main error type for crustomize operations
///
/// Pipeline failures (`ManifestNotFound` through `MissingHook`) are never retried
/// or swallowed. The one non-fatal condition, a missing overlay file, never becomes
/// an error at all.
#[derive(Error, Debug)]
pub enum CrustomizeError {
    /// No manifest file at the resolved location
    #[error("Manifest file not found: {path}")]
    ManifestNotFound {
        /// The canonical manifest path that was probed
        path: String,
    },

    /// Manifest text is not a parseable document
    #[error("Invalid manifest file syntax in {file}")]
    ManifestParseError {
        /// Path to the manifest file
        file: String,
        /// Parser message
        reason: String,
    },

    /// Schema validation failed
    #[error("{target} validation failed with {} violation(s):{}", violations.len(), format_violations(violations))]
    ValidationError {
        /// Whether the manifest or its values failed
        target: ValidationTarget,
        /// Every violation the validator reported
        violations: Vec<Violation>,
    },

    /// Base directory or object prefix does not exist
    #[error("Document source not found: {location}")]
    SourceNotFound {
        /// The location as written, or its resolved path
        location: String,
    },

    /// Render engine name is not recognised
    #[error("Unsupported rendering engine: {engine}")]
    UnsupportedEngine {
        /// The engine name that was requested
        engine: String,
    },

    /// A template helper asked for a file that does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path resolved against the document's working directory
        path: String,
    },

    /// Stack has no output with the requested key
    #[error("Output not found for stack: \"{stack}\" and key: \"{key}\"")]
    OutputNotFound {
        /// Stack name
        stack: String,
        /// Output key
        key: String,
    },

    /// A patch operation failed to apply
    #[error("Patch operation {index} failed ({operation}): {reason}")]
    PatchError {
        /// Zero-based index into the manifest's patch list
        index: usize,
        /// The operation, rendered as JSON
        operation: String,
        /// Why it failed
        reason: String,
    },

    /// A custom resource has no registered handler
    #[error("No hook registered for custom resource type '{type_suffix}'")]
    MissingHook {
        /// Type with the sentinel prefix stripped
        type_suffix: String,
    },

    /// Rendered document text could not be parsed
    #[error("Failed to parse document '{name}': {reason}")]
    DocumentParseError {
        /// Document name (file name or object key)
        name: String,
        /// Parser message
        reason: String,
    },

    /// The templating engine rejected a template
    #[error("Template rendering failed ({engine}): {reason}")]
    TemplateRenderError {
        /// Engine that rendered the template
        engine: String,
        /// Engine message
        reason: String,
    },

    /// A helper function was called incorrectly or failed
    #[error("Helper '{name}' failed: {reason}")]
    HelperError {
        /// Helper name
        name: String,
        /// Failure description
        reason: String,
    },

    /// A hook reported failure
    #[error("Hook '{type_suffix}' failed during {phase}: {reason}")]
    HookFailed {
        /// Hook type suffix
        type_suffix: String,
        /// `pre` or `post`
        phase: String,
        /// Failure description
        reason: String,
    },

    /// An external command exited with a non-zero status
    #[error("Command '{program}' failed: {stderr}")]
    CommandFailed {
        /// Program and arguments
        program: String,
        /// Captured stderr
        stderr: String,
    },

    /// An external executable is not installed
    #[error("'{program}' is not installed or not found in PATH")]
    CommandNotFound {
        /// Program name
        program: String,
    },

    /// The template linter reported problems
    #[error("Template lint failed:\n{diagnostics}")]
    LintFailed {
        /// Linter output
        diagnostics: String,
    },

    /// The command needs `stack` in the manifest
    #[error("'stack' is required in the manifest for this operation")]
    StackRequired,

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// A [`CrustomizeError`] with optional details and a suggestion for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: CrustomizeError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error with no suggestion or details.
    #[must_use]
    pub const fn new(error: CrustomizeError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion, shown in green.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error, shown in yellow.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions
///
/// Recognises [`CrustomizeError`] even under `.context(..)` (the outer message then
/// becomes the details line) and bare [`std::io::Error`]s. Anything else is printed
/// with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let outer = error.to_string();

    let error = match error.downcast::<CrustomizeError>() {
        Ok(typed) => {
            let wrapped = outer != typed.to_string();
            let ctx = create_error_context(typed);
            return if wrapped && ctx.details.is_none() {
                ctx.with_details(outer)
            } else {
                ctx
            };
        }
        Err(error) => error,
    };

    let error = match error.downcast::<std::io::Error>() {
        Ok(io_error) => {
            let suggestion = match io_error.kind() {
                std::io::ErrorKind::NotFound => {
                    "Check that the file or directory exists and the path is correct"
                }
                std::io::ErrorKind::PermissionDenied => {
                    "Check file ownership and permissions for the manifest and its documents"
                }
                _ => "Re-run with --verbose for more information",
            };
            return ErrorContext::new(CrustomizeError::IoError(io_error))
                .with_suggestion(suggestion);
        }
        Err(error) => error,
    };

    let mut message = error.to_string();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(CrustomizeError::Other {
        message,
    })
}

fn create_error_context(error: CrustomizeError) -> ErrorContext {
    match &error {
        CrustomizeError::ManifestNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Pass the directory that contains crustomize.yml, or the file itself"),
        CrustomizeError::ManifestParseError {
            reason,
            ..
        } => {
            let reason = reason.clone();
            ErrorContext::new(error)
                .with_details(reason)
                .with_suggestion("Check the YAML syntax: indentation, quotes and list markers")
        }
        CrustomizeError::ValidationError {
            target: ValidationTarget::Values,
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix the manifest 'values' so they satisfy values.schema.json"),
        CrustomizeError::ValidationError {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Allowed top-level keys: base, overlays, params, render, profile, stack, values, patches, vars",
        ),
        CrustomizeError::SourceNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("'base' is resolved relative to the manifest directory; check it exists"),
        CrustomizeError::UnsupportedEngine {
            ..
        } => ErrorContext::new(error).with_suggestion("Use --render handlebars or --render tera"),
        CrustomizeError::FileNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("getFile and fileToBase64 resolve paths against the rendering document's directory"),
        CrustomizeError::OutputNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the stack name, the output key and the --profile in use"),
        CrustomizeError::PatchError {
            ..
        } => ErrorContext::new(error).with_details(
            "Patches run in list order against the merged document; earlier operations change what later paths resolve to",
        ),
        CrustomizeError::MissingHook {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Register a hook with --hooks, CRUSTOMIZE_HOOKS or a crustomize_hooks directory",
        ),
        CrustomizeError::CommandNotFound {
            program,
        } => {
            let suggestion = format!("Install '{program}' and make sure it is on your PATH");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        CrustomizeError::StackRequired => ErrorContext::new(error)
            .with_suggestion("Add a 'stack' section with at least a 'name' to crustomize.yml"),
        _ => ErrorContext::new(error),
    }
}
