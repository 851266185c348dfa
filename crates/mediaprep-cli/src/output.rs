// MediaPrep - Client-side media preprocessing
// Copyright (C) 2025 MediaPrep Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Shared output formatting utilities for CLI commands.
//!
//! Status lines go to stdout so they can be piped; errors go to stderr.
//! `--quiet` suppresses everything except errors and machine output.

use console::style;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence status output for the rest of the process.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message with green checkmark emoji.
pub fn success(msg: &str) {
    if !quiet() {
        println!("{} {}", style("✅").green().bold(), msg);
    }
}

/// Print an error message to stderr with red X emoji.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("❌").red().bold(), msg);
}

/// Print an informational message with cyan info emoji.
pub fn info(msg: &str) {
    if !quiet() {
        println!("{} {}", style("ℹ️").cyan(), msg);
    }
}

/// Print a warning message with yellow warning emoji.
pub fn warning(msg: &str) {
    if !quiet() {
        println!("{} {}", style("⚠️").yellow(), msg);
    }
}

/// Print a detail line with key-value formatting.
///
/// The key is displayed in regular text, and the value is highlighted in cyan.
pub fn detail(key: &str, value: &str) {
    if !quiet() {
        println!("  {}: {}", key, style(value).cyan());
    }
}

/// Print a header message with camera emoji.
pub fn header(msg: &str) {
    if !quiet() {
        println!("{} {}", style("📷").green().bold(), msg);
    }
}
