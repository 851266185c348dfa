// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 MediaPrep Contributors

//! Path utilities for tests.

use std::path::{Path, PathBuf};

/// Where the CLI puts things.
pub struct TestPaths;

impl TestPaths {
    /// Output path the CLI writes for `input` inside `out_dir`.
    pub fn compressed_output(out_dir: &Path, input: &str, extension: &str) -> PathBuf {
        let stem = Path::new(input)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(input);
        out_dir.join(format!("{}.{}", stem, extension))
    }
}
