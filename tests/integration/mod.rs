//! Integration test suite for crustomize
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **pipeline**: end-to-end builds through the library API
//! - **hooks**: custom resource extraction and dispatch
//! - **cli**: the `crustomize` binary

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod hooks;
mod pipeline;
