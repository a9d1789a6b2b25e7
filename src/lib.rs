//! crustomize - layered CloudFormation templates
//!
//! A crustomize directory holds a `crustomize.yml` manifest that names a base
//! (a directory or object-store prefix of YAML/JSON documents), optional
//! overlays, an optional params document and the values available to templates.
//! Building it:
//!
//! 1. loads the manifest, substitutes its `vars` and validates it
//! 2. renders every document with the chosen engine (handlebars or tera)
//! 3. deep-merges the bases in name order, then each overlay in manifest order
//! 4. applies the manifest's JSON patches in order
//! 5. routes `Crustomize::*` resources to hooks instead of the output
//!
//! The result is printed, written as `template.yml` (plus `params.json`), or
//! handed to the cloud provider by the deploying commands.
//!
//! # Manifest Example
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
//! render: tera
//! stack:
//!   name: web-${env}
//!   capabilities: [CAPABILITY_IAM]
//!   tags:
//!     Env: ${env}
//! values:
//!   bucket: web-${env}-assets
//! patches:
//!   - op: remove
//!     path: /Outputs/Debug
//! ```
//!
//! # Modules
//!
//! - [`manifest`] - manifest loading, `vars` substitution, validation and caching
//! - [`source`] - local and object-store document locations
//! - [`templating`] - the two engines, the helper table and custom helpers
//! - [`merge`] - deep merge and JSON patches
//! - [`hooks`] - custom resource extraction and hook dispatch
//! - [`resolver`] - the build pipeline tying the above together
//! - [`cfn`] - CloudFormation-aware YAML
//! - [`aws`] / [`process`] / [`lint`] - external commands
//! - [`config`] - `.crustomizerc` defaults
//! - [`cli`] - the command-line interface
//! - [`core`] - errors and file helpers

pub mod aws;
pub mod cfn;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod hooks;
pub mod lint;
pub mod manifest;
pub mod merge;
pub mod process;
pub mod resolver;
pub mod source;
pub mod templating;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
