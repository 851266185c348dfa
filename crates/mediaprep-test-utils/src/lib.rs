// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 MediaPrep Contributors

//! # MediaPrep Test Utilities
//!
//! Shared test utilities for MediaPrep crates providing:
//! - CLI command helpers for testing the mediaprep binary
//! - Synthetic image fixtures of controllable size
//! - Expected output paths
//! - Custom assertions for compressed output

pub mod assertions;
pub mod cli;
pub mod fixtures;
pub mod platform;

// Re-export commonly used items at crate root
pub use assertions::*;
pub use cli::{mediaprep, MediaprepCommand};
pub use fixtures::TestFixtures;
pub use platform::TestPaths;
