// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 MediaPrep Contributors

//! CLI command helpers for testing the mediaprep binary.
//!
//! Provides convenient wrappers around assert_cmd.

use assert_cmd::Command;
use std::path::Path;

/// Creates a new mediaprep Command for testing.
///
/// Logging is pinned to `error` so stderr assertions are not polluted by
/// the caller's `RUST_LOG`.
///
/// # Example
/// ```ignore
/// use mediaprep_test_utils::mediaprep;
///
/// mediaprep()
///     .args(["image", "photo.png"])
///     .current_dir(temp_dir.path())
///     .assert()
///     .success();
/// ```
#[allow(deprecated)] // cargo_bin is deprecated but still works for our use case
pub fn mediaprep() -> Command {
    let mut cmd = Command::cargo_bin("mediaprep").expect("mediaprep binary not found");
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("MEDIAPREP_IMAGE_MAX_SIZE_MB");
    cmd.env_remove("MEDIAPREP_VIDEO_MAX_SIZE_MB");
    cmd
}

/// Fluent API wrapper for common mediaprep command patterns.
pub struct MediaprepCommand {
    cmd: Command,
}

impl MediaprepCommand {
    /// Create a new MediaprepCommand.
    pub fn new() -> Self {
        Self { cmd: mediaprep() }
    }

    /// Set the working directory for the command.
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cmd.current_dir(dir);
        self
    }

    /// Add an argument to the command.
    pub fn arg(mut self, arg: &str) -> Self {
        self.cmd.arg(arg);
        self
    }

    /// Add multiple arguments to the command.
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    /// Set an environment variable for the command.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Execute the command and assert success.
    pub fn run_success(mut self) -> assert_cmd::assert::Assert {
        self.cmd.assert().success()
    }

    /// Execute the command and assert failure.
    pub fn run_failure(mut self) -> assert_cmd::assert::Assert {
        self.cmd.assert().failure()
    }

    /// Get the underlying Command for custom assertions.
    pub fn into_inner(self) -> Command {
        self.cmd
    }

    /// Compress images in `dir` into `dir/out`, quietly.
    pub fn compress_images(dir: &Path, files: &[&str], max_size_mb: f64) {
        let mut cmd = mediaprep();
        cmd.arg("-q")
            .arg("image")
            .args(files)
            .arg("-o")
            .arg("out")
            .arg("--max-size-mb")
            .arg(max_size_mb.to_string())
            .current_dir(dir);
        cmd.assert().success();
    }
}

impl Default for MediaprepCommand {
    fn default() -> Self {
        Self::new()
    }
}
