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

use indicatif::{HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Progress bars for batch commands
///
/// Draws to stderr so stdout stays clean for piping and `--json`.
pub struct ProgressTracker {
    multi: MultiProgress,
    quiet: bool,
}

impl ProgressTracker {
    /// Create new progress tracker
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: if quiet {
                MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
            } else {
                MultiProgress::with_draw_target(ProgressDrawTarget::stderr())
            },
            quiet,
        }
    }

    /// Create progress bar for file operations
    pub fn file_bar(&self, msg: &str, total: u64) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.magenta} {msg} [{bar:40.magenta/blue}] {pos}/{len} files ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// Totals for one batch command
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchStats {
    /// Files attempted
    pub files: u64,
    /// Files written to the output directory
    pub succeeded: u64,
    /// Files that failed
    pub failed: u64,
    /// Files left unprocessed after an interrupt
    pub skipped: u64,
    /// Files re-encoded
    pub reencoded: u64,
    /// Files kept best-effort above the budget
    pub over_budget: u64,
    /// Input bytes of the successful files
    pub bytes_in: u64,
    /// Output bytes of the successful files
    pub bytes_out: u64,
    /// Wall-clock time
    pub duration_ms: u64,
}

impl BatchStats {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{}/{} files", self.succeeded, self.files)];

        if self.bytes_in > 0 {
            parts.push(format!(
                "{} → {}",
                HumanBytes(self.bytes_in),
                HumanBytes(self.bytes_out)
            ));
        }
        if self.reencoded > 0 {
            parts.push(format!("{} re-encoded", self.reencoded));
        }
        if self.over_budget > 0 {
            parts.push(format!("{} over budget", self.over_budget));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if self.duration_ms > 0 {
            parts.push(format!(
                "in {}",
                HumanDuration(Duration::from_millis(self.duration_ms))
            ));
        }

        parts.join(", ")
    }
}
