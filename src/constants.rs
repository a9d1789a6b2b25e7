//! Well-known names shared across the crate.
//!
//! File names, environment variables and prefixes that users see. Defining them
//! in one place keeps the CLI, the loaders and the tests in agreement.

/// Conventional manifest file name inside a crustomize directory.
pub const MANIFEST_FILE_NAME: &str = "crustomize.yml";

/// Values schema file, looked up beside the resolved base directory.
pub const VALUES_SCHEMA_FILE_NAME: &str = "values.schema.json";

/// Extensions (lower-case, without the dot) recognised as documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

/// Scheme prefix for object-store locations.
pub const OBJECT_STORE_SCHEME: &str = "s3://";

/// `Type` prefix that routes a resource to hook dispatch.
pub const CUSTOM_RESOURCE_PREFIX: &str = "Crustomize::";

/// Primary output artifact name.
pub const TEMPLATE_OUTPUT_FILE: &str = "template.yml";

/// Params output artifact name.
pub const PARAMS_OUTPUT_FILE: &str = "params.json";

/// Environment variable naming custom helper definition files.
pub const HELPERS_ENV_VAR: &str = "CRUSTOMIZE_HELPERS";

/// Default helper definition path, ignored when absent.
pub const DEFAULT_HELPERS_PATH: &str = "crustomize_helpers";

/// Environment variable naming hook definition files.
pub const HOOKS_ENV_VAR: &str = "CRUSTOMIZE_HOOKS";

/// Default hook definition path, ignored when absent.
pub const DEFAULT_HOOKS_PATH: &str = "crustomize_hooks";

/// Environment variable exported to custom helper commands.
pub const PROFILE_ENV_VAR: &str = "CRUSTOMIZE_PROFILE";

/// Run-defaults file name, looked up in the home and current directories.
pub const CONFIG_FILE_NAME: &str = ".crustomizerc";

/// Default rendering engine.
pub const DEFAULT_ENGINE: &str = "handlebars";
