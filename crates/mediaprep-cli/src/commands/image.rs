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

use crate::output;
use crate::progress::{BatchStats, ProgressTracker};
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::HumanBytes;
use mediaprep_config::Config;
use mediaprep_media::blob::extension_for_mime;
use mediaprep_media::{CompressionConfig, ImageCompressor, MediaBlob, MediaError, MediaKind};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Compress images below a size budget
#[derive(Parser, Debug)]
pub struct ImageCmd {
    /// Images to compress, processed in order
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "compressed")]
    pub output: PathBuf,

    /// Size budget in megabytes
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<f64>,

    /// Starting JPEG quality in (0, 1]
    #[arg(long)]
    pub quality: Option<f32>,

    /// Bounding box width
    #[arg(long, value_name = "PX")]
    pub max_width: Option<u32>,

    /// Bounding box height
    #[arg(long, value_name = "PX")]
    pub max_height: Option<u32>,

    /// Print a JSON report instead of text
    #[arg(long)]
    pub json: bool,
}

/// Result for one input file
#[derive(Debug, Serialize)]
struct FileReport {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    input_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_bytes: Option<u64>,
    attempts: usize,
    reencoded: bool,
    budget_met: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileReport {
    fn unprocessed(input: &Path, input_bytes: u64) -> Self {
        FileReport {
            input: input.to_path_buf(),
            output: None,
            input_bytes,
            output_bytes: None,
            attempts: 0,
            reencoded: false,
            budget_met: false,
            skipped: false,
            error: None,
        }
    }

    fn skipped(input: &Path, input_bytes: u64) -> Self {
        FileReport {
            skipped: true,
            ..FileReport::unprocessed(input, input_bytes)
        }
    }

    fn failed(input: &Path, input_bytes: u64, error: &anyhow::Error) -> Self {
        FileReport {
            error: Some(format!("{:#}", error)),
            ..FileReport::unprocessed(input, input_bytes)
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    files: &'a [FileReport],
    stats: &'a BatchStats,
}

/// Names handed out so far in one batch
#[derive(Debug, Default)]
struct OutputNames {
    taken: HashSet<String>,
}

impl OutputNames {
    /// First free name for `wanted`. Names already written in this batch and
    /// `input_name` (the input itself, when it lives in the output directory)
    /// are taken; a clash gets a `-1`, `-2`, ... suffix before the extension.
    fn claim(&mut self, wanted: &str, input_name: Option<&str>) -> String {
        let mut name = wanted.to_string();
        let mut n = 1u32;
        while self.taken.contains(&name) || Some(name.as_str()) == input_name {
            name = suffixed(wanted, n);
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

fn suffixed(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", name, n),
    }
}

impl ImageCmd {
    /// Compress every file in order, then report
    pub async fn execute(&self, config: &Config, token: &CancellationToken, quiet: bool) -> Result<()> {
        let settings = self.compression_config(config);
        let compressor = ImageCompressor::new(settings).context("invalid image settings")?;

        fs::create_dir_all(&self.output)
            .await
            .with_context(|| format!("cannot create {}", self.output.display()))?;

        if !self.json {
            output::header(&format!(
                "Compressing {} image(s) to {} (budget {})",
                self.files.len(),
                self.output.display(),
                HumanBytes(compressor.config().max_size_bytes)
            ));
        }

        let started = Instant::now();
        let (reports, mut stats) = self.run_batch(&compressor, token, quiet).await?;
        stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if self.json {
            let report = Report {
                files: &reports,
                stats: &stats,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            output::info(&stats.summary());
            if stats.skipped > 0 {
                output::warning(&format!(
                    "interrupted; {} file(s) left unprocessed",
                    stats.skipped
                ));
            }
        }

        if stats.failed > 0 {
            bail!("{} of {} file(s) failed", stats.failed, stats.files);
        }
        Ok(())
    }

    /// Process the files in order. Once `token` fires the rest are reported
    /// as skipped, and so is the file it interrupted.
    async fn run_batch(
        &self,
        compressor: &ImageCompressor,
        token: &CancellationToken,
        quiet: bool,
    ) -> Result<(Vec<FileReport>, BatchStats)> {
        let out_dir = fs::canonicalize(&self.output)
            .await
            .with_context(|| format!("cannot resolve {}", self.output.display()))?;
        let tracker = ProgressTracker::new(quiet || self.json);
        let bar = tracker.file_bar("Compressing", self.files.len() as u64);
        let mut names = OutputNames::default();
        let mut stats = BatchStats::default();
        let mut reports = Vec::with_capacity(self.files.len());

        for path in &self.files {
            let report = if token.is_cancelled() {
                FileReport::skipped(path, input_size(path).await)
            } else {
                bar.set_message(path.display().to_string());
                match self.compress_one(compressor, path, &out_dir, &mut names, token).await {
                    Ok(report) => report,
                    Err(e) if token.is_cancelled() || was_cancelled(&e) => {
                        debug!(path = %path.display(), "interrupted");
                        FileReport::skipped(path, input_size(path).await)
                    }
                    Err(e) => FileReport::failed(path, input_size(path).await, &e),
                }
            };
            record(&mut stats, &report);
            bar.inc(1);
            if !self.json {
                bar.suspend(|| print_report(&report));
            }
            reports.push(report);
        }

        bar.finish_and_clear();
        Ok((reports, stats))
    }

    fn compression_config(&self, config: &Config) -> CompressionConfig {
        let mut settings = config.image.to_compression_config();
        if let Some(mb) = self.max_size_mb {
            settings = settings.with_max_size_mb(mb);
        }
        if let Some(quality) = self.quality {
            settings = settings.with_quality(quality);
        }
        let width = self.max_width.unwrap_or(settings.max_width);
        let height = self.max_height.unwrap_or(settings.max_height);
        settings.with_max_dimensions(width, height)
    }

    #[instrument(skip(self, compressor, path, out_dir, names, token), fields(path = %path.display()))]
    async fn compress_one(
        &self,
        compressor: &ImageCompressor,
        path: &Path,
        out_dir: &Path,
        names: &mut OutputNames,
        token: &CancellationToken,
    ) -> Result<FileReport> {
        let blob = MediaBlob::from_path(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        if blob.kind() != MediaKind::Image {
            bail!("{} is not an image ({})", path.display(), blob.mime_type());
        }

        let input_bytes = blob.len();
        let outcome = compressor.compress(blob, token).await?;

        let input_name = match fs::canonicalize(path).await {
            Ok(real) if real.parent() == Some(out_dir) => {
                real.file_name().map(|n| n.to_string_lossy().into_owned())
            }
            _ => None,
        };
        let wanted = output_name(path, outcome.blob.mime_type(), outcome.was_reencoded());
        let target = self.output.join(names.claim(&wanted, input_name.as_deref()));
        debug!(target = %target.display(), bytes = outcome.blob.len(), "writing output");
        fs::write(&target, outcome.blob.as_bytes())
            .await
            .with_context(|| format!("cannot write {}", target.display()))?;

        Ok(FileReport {
            output: Some(target),
            output_bytes: Some(outcome.blob.len()),
            attempts: outcome.attempts.len(),
            reencoded: outcome.was_reencoded(),
            budget_met: outcome.budget_met,
            ..FileReport::unprocessed(path, input_bytes)
        })
    }
}

async fn input_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

fn was_cancelled(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<MediaError>().is_some_and(MediaError::is_cancelled))
}

/// Re-encoded files take the output format's extension; untouched files keep
/// their name.
fn output_name(input: &Path, mime_type: &str, reencoded: bool) -> String {
    if reencoded {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        format!("{}.{}", stem, extension_for_mime(mime_type))
    } else {
        input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("image.{}", extension_for_mime(mime_type)))
    }
}

fn record(stats: &mut BatchStats, report: &FileReport) {
    stats.files += 1;
    match report.output_bytes {
        Some(output_bytes) => {
            stats.succeeded += 1;
            stats.bytes_in += report.input_bytes;
            stats.bytes_out += output_bytes;
            if report.reencoded {
                stats.reencoded += 1;
            }
            if !report.budget_met {
                stats.over_budget += 1;
            }
        }
        None if report.skipped => stats.skipped += 1,
        None => stats.failed += 1,
    }
}

fn print_report(report: &FileReport) {
    match (&report.output, report.output_bytes, &report.error) {
        (Some(target), Some(output_bytes), _) => {
            let verb = if report.reencoded { "compressed" } else { "kept" };
            output::success(&format!(
                "{} {} → {} ({} → {})",
                verb,
                report.input.display(),
                target.display(),
                HumanBytes(report.input_bytes),
                HumanBytes(output_bytes)
            ));
            if !report.budget_met {
                output::warning(&format!(
                    "{} is still above the budget after {} attempt(s); kept the smallest encode",
                    target.display(),
                    report.attempts
                ));
            }
        }
        (_, _, Some(error)) => output::error(&format!("{}: {}", report.input.display(), error)),
        _ if report.skipped => output::info(&format!("skipped {}", report.input.display())),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaprep_test_utils::TestFixtures;
    use tempfile::TempDir;

    fn image_cmd(files: Vec<PathBuf>, output: PathBuf) -> ImageCmd {
        ImageCmd {
            files,
            output,
            max_size_mb: Some(0.01),
            quality: None,
            max_width: None,
            max_height: None,
            json: true,
        }
    }

    #[test]
    fn test_reencoded_output_takes_jpg_extension() {
        let name = output_name(Path::new("shots/photo.png"), "image/jpeg", true);
        assert_eq!(name, "photo.jpg");
    }

    #[test]
    fn test_untouched_output_keeps_name() {
        let name = output_name(Path::new("shots/photo.png"), "image/png", false);
        assert_eq!(name, "photo.png");
    }

    #[test]
    fn test_same_stem_outputs_get_suffixes() {
        let mut names = OutputNames::default();
        assert_eq!(names.claim("a.jpg", None), "a.jpg");
        assert_eq!(names.claim("a.jpg", None), "a-1.jpg");
        assert_eq!(names.claim("a.jpg", None), "a-2.jpg");
        assert_eq!(names.claim("b.jpg", None), "b.jpg");
    }

    #[test]
    fn test_input_in_output_dir_is_never_overwritten() {
        let mut names = OutputNames::default();
        assert_eq!(names.claim("a.jpg", Some("a.jpg")), "a-1.jpg");
        assert_eq!(names.claim("a.png", Some("a.jpg")), "a.png");
    }

    #[test]
    fn test_suffix_without_extension() {
        assert_eq!(suffixed("README", 3), "README-3");
        assert_eq!(suffixed(".hidden", 1), ".hidden-1");
    }

    #[test]
    fn test_failures_are_counted() {
        let mut stats = BatchStats::default();
        record(
            &mut stats,
            &FileReport::failed(Path::new("a.png"), 10, &anyhow::anyhow!("broken")),
        );
        assert_eq!((stats.files, stats.failed, stats.bytes_in), (1, 1, 0));
    }

    #[test]
    fn test_cancellation_is_not_a_failure() {
        let err = anyhow::Error::from(MediaError::Cancelled).context("compressing a.png");
        assert!(was_cancelled(&err));
        assert!(!was_cancelled(&anyhow::anyhow!("broken")));

        let mut stats = BatchStats::default();
        record(&mut stats, &FileReport::skipped(Path::new("a.png"), 10));
        assert_eq!((stats.files, stats.failed, stats.skipped), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_every_file() {
        let temp = TempDir::new().unwrap();
        let a = TestFixtures::write(temp.path(), "a.png", &TestFixtures::noise_png(320, 240));
        let b = TestFixtures::write(temp.path(), "b.png", &TestFixtures::noise_png(320, 240));
        let out = temp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();

        let cmd = image_cmd(vec![a, b], out.clone());
        let compressor = ImageCompressor::new(cmd.compression_config(&Config::default())).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let (reports, stats) = cmd.run_batch(&compressor, &token, true).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.skipped && r.error.is_none()));
        assert_eq!((stats.files, stats.skipped, stats.failed, stats.succeeded), (2, 2, 0, 0));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_exits_cleanly() {
        let temp = TempDir::new().unwrap();
        let a = TestFixtures::write(temp.path(), "a.png", &TestFixtures::noise_png(64, 64));
        let cmd = image_cmd(vec![a], temp.path().join("out"));
        let token = CancellationToken::new();
        token.cancel();

        cmd.execute(&Config::default(), &token, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_output_next_to_input_keeps_the_input() {
        let temp = TempDir::new().unwrap();
        let original = TestFixtures::gradient_jpeg(48, 32);
        let a = TestFixtures::write(temp.path(), "a.jpg", &original);

        let cmd = ImageCmd {
            max_size_mb: Some(1.0),
            ..image_cmd(vec![a.clone()], temp.path().to_path_buf())
        };
        let compressor = ImageCompressor::new(cmd.compression_config(&Config::default())).unwrap();
        let (reports, stats) = cmd
            .run_batch(&compressor, &CancellationToken::new(), true)
            .await
            .unwrap();

        assert_eq!(stats.succeeded, 1);
        assert_eq!(reports[0].output.as_deref(), Some(temp.path().join("a-1.jpg").as_path()));
        assert_eq!(std::fs::read(&a).unwrap(), original);
    }
}
