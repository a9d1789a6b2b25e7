//! Common test utilities and fixtures for crustomize integration tests

// Not every helper is used by every test module
#![allow(dead_code)]

mod manifest_builder;

pub use manifest_builder::ManifestBuilder;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A crustomize directory in a fresh temporary location.
///
/// The temporary root doubles as `HOME` for spawned binaries, so a developer's
/// own `~/.crustomizerc` never leaks into a test.
pub struct TestProject {
    _temp_dir: TempDir,
    root: PathBuf,
    project_dir: PathBuf,
}

impl TestProject {
    /// Create an empty project directory
    pub fn new() -> Result<Self> {
        crustomize::test_utils::init_test_logging(None);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();
        let project_dir = root.join("project");
        fs::create_dir_all(&project_dir)?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
            project_dir,
        })
    }

    /// The crustomize directory
    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    /// The temporary root, outside the crustomize directory
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Write a file relative to the crustomize directory, creating parents
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.project_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write `crustomize.yml`
    pub fn write_manifest(&self, content: &str) -> Result<()> {
        self.write("crustomize.yml", content)?;
        Ok(())
    }

    /// Run the crustomize binary with the project as working directory
    pub fn run_crustomize(&self, args: &[&str]) -> Result<CommandOutput> {
        let binary = env!("CARGO_BIN_EXE_crustomize");
        let output = Command::new(binary)
            .args(args)
            .current_dir(&self.project_dir)
            .env("HOME", &self.root)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env_remove("CRUSTOMIZE_HELPERS")
            .env_remove("CRUSTOMIZE_HOOKS")
            .output()
            .context("Failed to run crustomize")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Command output helper
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Assert the command succeeded
    pub fn assert_success(&self) -> &Self {
        assert!(self.success, "Command failed with code {:?}\nStderr: {}", self.code, self.stderr);
        self
    }

    /// Assert the command failed with exit code 1
    pub fn assert_failure(&self) -> &Self {
        assert_eq!(self.code, Some(1), "Expected failure\nStdout: {}", self.stdout);
        self
    }

    /// Assert stderr contains the given text
    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
