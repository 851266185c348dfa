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
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{HumanBytes, HumanDuration};
use mediaprep_config::Config;
use mediaprep_media::attempt::MAX_RETRY_DEPTH;
use mediaprep_media::policy::plan_for;
use mediaprep_media::raster::{even_dimensions, fit_within, scale_by};
use mediaprep_media::{
    CompressionConfig, ConversionConfig, Mp4Probe, PipelineTimeouts, SizeBand, VideoMetadata,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Show how videos would be compressed
#[derive(Parser, Debug)]
pub struct PlanCmd {
    /// MP4 files to inspect
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Size budget in megabytes
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<f64>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct AttemptPlan {
    retry_depth: u8,
    width: u32,
    height: u32,
    bitrate_bps: u64,
    estimated_bytes: u64,
}

/// What the format converter would do with the source when the compressor
/// cannot load it
#[derive(Debug, Serialize)]
struct ConversionPlan {
    ceiling_bytes: u64,
    /// Above the ceiling the converter hands the source to the compressor
    delegated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bitrate_bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_bytes: Option<u64>,
}

/// Everything `plan` reads from the configuration
struct PlanSettings {
    compression: CompressionConfig,
    conversion: ConversionConfig,
    timeouts: PipelineTimeouts,
}

#[derive(Debug, Serialize)]
struct FilePlan {
    input: PathBuf,
    source_bytes: u64,
    budget_bytes: u64,
    width: u32,
    height: u32,
    duration_ms: u64,
    has_audio: bool,
    within_budget: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    band: Option<SizeBand>,
    attempts: Vec<AttemptPlan>,
    load_timeout_ms: u64,
    conversion: ConversionPlan,
}

impl PlanCmd {
    /// Probe each file and print its plan
    pub async fn execute(&self, config: &Config) -> Result<()> {
        let mut compression = config.video.to_compression_config();
        if let Some(mb) = self.max_size_mb {
            compression = compression.with_max_size_mb(mb);
        }
        compression.validate().context("invalid video settings")?;
        let conversion = ConversionConfig {
            max_width: compression.max_width,
            max_height: compression.max_height,
            ..config.converter.to_conversion_config()
        };
        conversion.validate().context("invalid converter settings")?;
        let settings = PlanSettings {
            compression,
            conversion,
            timeouts: config.video.timeouts(),
        };

        let probe = Mp4Probe::new();
        let mut plans = Vec::with_capacity(self.files.len());
        let mut failed = 0usize;

        for path in &self.files {
            let data = fs::read(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            match probe.probe(&data) {
                Ok(metadata) => {
                    let plan = describe(path.clone(), data.len() as u64, &metadata, &settings);
                    if !self.json {
                        print_plan(&plan);
                    }
                    plans.push(plan);
                }
                Err(e) => {
                    failed += 1;
                    output::error(&format!("{}: {}", path.display(), e));
                }
            }
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }

        if failed > 0 {
            bail!("{} of {} file(s) could not be probed", failed, self.files.len());
        }
        Ok(())
    }
}

fn describe(
    input: PathBuf,
    source_bytes: u64,
    metadata: &VideoMetadata,
    plan_settings: &PlanSettings,
) -> FilePlan {
    let settings = &plan_settings.compression;
    let within_budget = source_bytes <= settings.max_size_bytes;
    let recorded = metadata.duration.min(settings.max_duration);

    let (band, attempts) = if within_budget {
        (None, Vec::new())
    } else {
        let plan = plan_for(source_bytes, settings);
        let attempts = (0..=MAX_RETRY_DEPTH)
            .map(|depth| {
                let step = plan.at_depth(depth);
                let (w, h) = scale_by(metadata.width, metadata.height, step.scale);
                let (w, h) = fit_within(w, h, settings.max_width, settings.max_height);
                let (width, height) = even_dimensions(w, h);
                AttemptPlan {
                    retry_depth: depth,
                    width,
                    height,
                    bitrate_bps: step.bitrate_bps,
                    estimated_bytes: estimate_bytes(step.bitrate_bps, recorded),
                }
            })
            .collect();
        (Some(plan.band), attempts)
    };

    FilePlan {
        input,
        source_bytes,
        budget_bytes: settings.max_size_bytes,
        width: metadata.width,
        height: metadata.height,
        duration_ms: duration_ms(metadata.duration),
        has_audio: metadata.has_audio,
        within_budget,
        band,
        attempts,
        load_timeout_ms: duration_ms(plan_settings.timeouts.load),
        conversion: describe_conversion(source_bytes, metadata, &plan_settings.conversion),
    }
}

fn describe_conversion(
    source_bytes: u64,
    metadata: &VideoMetadata,
    conversion: &ConversionConfig,
) -> ConversionPlan {
    if source_bytes > conversion.ceiling_bytes {
        return ConversionPlan {
            ceiling_bytes: conversion.ceiling_bytes,
            delegated: true,
            width: None,
            height: None,
            bitrate_bps: None,
            estimated_bytes: None,
        };
    }

    let (w, h) = fit_within(
        metadata.width,
        metadata.height,
        conversion.max_width,
        conversion.max_height,
    );
    let (width, height) = even_dimensions(w, h);
    let recorded = metadata.duration.min(conversion.max_duration);
    ConversionPlan {
        ceiling_bytes: conversion.ceiling_bytes,
        delegated: false,
        width: Some(width),
        height: Some(height),
        bitrate_bps: Some(conversion.bitrate_bps),
        estimated_bytes: Some(estimate_bytes(conversion.bitrate_bps, recorded)),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Output size at `bitrate_bps` for `recorded`, ignoring container overhead
fn estimate_bytes(bitrate_bps: u64, recorded: Duration) -> u64 {
    (bitrate_bps as f64 * recorded.as_secs_f64() / 8.0).round() as u64
}

fn print_plan(plan: &FilePlan) {
    output::header(&plan.input.display().to_string());
    output::detail(
        "Source",
        &format!(
            "{}x{}, {}, {}{}",
            plan.width,
            plan.height,
            HumanDuration(Duration::from_millis(plan.duration_ms)),
            HumanBytes(plan.source_bytes),
            if plan.has_audio { ", audio" } else { "" }
        ),
    );
    output::detail("Budget", &HumanBytes(plan.budget_bytes).to_string());

    if plan.within_budget {
        output::success("within budget, uploaded unchanged");
        return;
    }

    output::detail(
        "Load timeout",
        &HumanDuration(Duration::from_millis(plan.load_timeout_ms)).to_string(),
    );
    let conversion = &plan.conversion;
    let fallback = match (conversion.width, conversion.height, conversion.bitrate_bps) {
        (Some(width), Some(height), Some(bitrate)) if !conversion.delegated => format!(
            "convert to {}x{} at {} kbps, ~{}",
            width,
            height,
            bitrate / 1000,
            HumanBytes(conversion.estimated_bytes.unwrap_or(0))
        ),
        _ => format!(
            "above the {} conversion ceiling, compressed directly",
            HumanBytes(conversion.ceiling_bytes)
        ),
    };
    output::detail("Fallback", &fallback);

    if let Some(band) = plan.band {
        output::detail("Band", &band.to_string());
    }
    for attempt in &plan.attempts {
        let label = if attempt.retry_depth == 0 {
            "Attempt".to_string()
        } else {
            format!("Retry {}", attempt.retry_depth)
        };
        output::detail(
            &label,
            &format!(
                "{}x{} at {} kbps, ~{}",
                attempt.width,
                attempt.height,
                attempt.bitrate_bps / 1000,
                HumanBytes(attempt.estimated_bytes)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> PlanSettings {
        PlanSettings {
            compression: CompressionConfig::video_defaults(),
            conversion: ConversionConfig::default(),
            timeouts: PipelineTimeouts::default(),
        }
    }

    fn from_config(config: &Config) -> PlanSettings {
        PlanSettings {
            compression: config.video.to_compression_config(),
            conversion: config.converter.to_conversion_config(),
            timeouts: config.video.timeouts(),
        }
    }

    fn metadata(width: u32, height: u32, secs: u64) -> VideoMetadata {
        VideoMetadata {
            width,
            height,
            duration: Duration::from_secs(secs),
            has_audio: false,
        }
    }

    #[test]
    fn test_small_source_has_no_attempts() {
        let settings = defaults();
        let plan = describe(PathBuf::from("a.mp4"), 1024, &metadata(1920, 1080, 10), &settings);
        assert!(plan.within_budget);
        assert!(plan.attempts.is_empty());
        assert!(plan.band.is_none());
    }

    #[test]
    fn test_huge_source_halves_then_quarters() {
        let settings = defaults();
        let plan = describe(
            PathBuf::from("a.mp4"),
            120 * 1024 * 1024,
            &metadata(1920, 1080, 120),
            &settings,
        );
        assert_eq!(plan.band, Some(SizeBand::Huge));
        assert_eq!(plan.attempts.len(), 2);
        assert_eq!((plan.attempts[0].width, plan.attempts[0].height), (960, 540));
        assert_eq!(plan.attempts[0].bitrate_bps, 500_000);
        assert_eq!((plan.attempts[1].width, plan.attempts[1].height), (480, 270));
        assert_eq!(plan.attempts[1].bitrate_bps, 250_000);
    }

    #[test]
    fn test_estimate_uses_capped_duration() {
        let settings = defaults();
        let plan = describe(
            PathBuf::from("a.mp4"),
            60 * 1024 * 1024,
            &metadata(1280, 720, 600),
            &settings,
        );
        // 30s cap at the proportional bitrate
        let bitrate = plan.attempts[0].bitrate_bps;
        assert_eq!(
            plan.attempts[0].estimated_bytes,
            estimate_bytes(bitrate, Duration::from_secs(30))
        );
        assert!(plan.attempts[0].estimated_bytes < 4 * 1024 * 1024);
    }

    #[test]
    fn test_conversion_below_ceiling_uses_converter_bitrate() {
        let mut config = Config::default();
        config.converter.bitrate = 600_000;
        config.video.load_timeout_ms = 4_000;
        let plan = describe(
            PathBuf::from("a.mp4"),
            20 * 1024 * 1024,
            &metadata(3840, 2160, 10),
            &from_config(&config),
        );
        assert_eq!(plan.load_timeout_ms, 4_000);
        assert!(!plan.conversion.delegated);
        assert_eq!(plan.conversion.bitrate_bps, Some(600_000));
        assert_eq!(
            plan.conversion.estimated_bytes,
            Some(estimate_bytes(600_000, Duration::from_secs(10)))
        );
        let bounds = ConversionConfig::default();
        let (width, height) = (plan.conversion.width.unwrap(), plan.conversion.height.unwrap());
        assert!(width <= bounds.max_width && height <= bounds.max_height);
        assert_eq!(width % 2, 0);
    }

    #[test]
    fn test_conversion_above_ceiling_is_delegated() {
        let mut config = Config::default();
        config.converter.ceiling_mb = 10.0;
        let plan = describe(
            PathBuf::from("a.mp4"),
            20 * 1024 * 1024,
            &metadata(1280, 720, 10),
            &from_config(&config),
        );
        assert!(plan.conversion.delegated);
        assert_eq!(plan.conversion.ceiling_bytes, 10 * 1024 * 1024);
        assert!(plan.conversion.bitrate_bps.is_none());
    }
}
