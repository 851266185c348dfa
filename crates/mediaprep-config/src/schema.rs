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

use mediaprep_media::config::mb_to_bytes;
use mediaprep_media::{CompressionConfig, ConversionConfig, PipelineTimeouts};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Still-image compression
    pub image: ImageSettings,

    /// Video compression
    pub video: VideoSettings,

    /// Format conversion fallback
    pub converter: ConverterSettings,

    /// Logging
    pub observability: ObservabilityConfig,
}

/// Still-image compression settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSettings {
    /// Size budget in megabytes
    #[serde(default = "default_image_max_size_mb")]
    pub max_size_mb: f64,

    /// Starting JPEG quality in (0, 1]
    #[serde(default = "default_quality")]
    pub quality: f32,

    /// Bounding box width
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Bounding box height
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

impl ImageSettings {
    /// Core compressor configuration
    pub fn to_compression_config(&self) -> CompressionConfig {
        CompressionConfig::image_defaults()
            .with_max_size_mb(self.max_size_mb)
            .with_quality(self.quality)
            .with_max_dimensions(self.max_width, self.max_height)
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        ImageSettings {
            max_size_mb: default_image_max_size_mb(),
            quality: default_quality(),
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

/// Video compression settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSettings {
    /// Size budget in megabytes
    #[serde(default = "default_video_max_size_mb")]
    pub max_size_mb: f64,

    /// Base bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub target_bitrate: u64,

    /// Recording cap in milliseconds
    #[serde(default = "default_recording_time_ms")]
    pub max_recording_time_ms: u64,

    /// Bound on loading a source, in milliseconds
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Bounding box width
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Bounding box height
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

impl VideoSettings {
    /// Core compressor configuration
    pub fn to_compression_config(&self) -> CompressionConfig {
        CompressionConfig::video_defaults()
            .with_max_size_mb(self.max_size_mb)
            .with_target_bitrate(self.target_bitrate)
            .with_max_duration(Duration::from_millis(self.max_recording_time_ms))
            .with_max_dimensions(self.max_width, self.max_height)
    }

    /// Suspension bounds for the processor
    pub fn timeouts(&self) -> PipelineTimeouts {
        PipelineTimeouts {
            load: Duration::from_millis(self.load_timeout_ms),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        VideoSettings {
            max_size_mb: default_video_max_size_mb(),
            target_bitrate: default_bitrate(),
            max_recording_time_ms: default_recording_time_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

/// Format conversion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConverterSettings {
    /// Sources above this many megabytes go through the compressor instead
    #[serde(default = "default_ceiling_mb")]
    pub ceiling_mb: f64,

    /// Fixed output bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u64,

    /// Recording cap in milliseconds
    #[serde(default = "default_recording_time_ms")]
    pub max_recording_time_ms: u64,
}

impl ConverterSettings {
    /// Core converter configuration
    pub fn to_conversion_config(&self) -> ConversionConfig {
        ConversionConfig {
            ceiling_bytes: mb_to_bytes(self.ceiling_mb),
            bitrate_bps: self.bitrate,
            max_duration: Duration::from_millis(self.max_recording_time_ms),
            ..ConversionConfig::default()
        }
    }
}

impl Default for ConverterSettings {
    fn default() -> Self {
        ConverterSettings {
            ceiling_mb: default_ceiling_mb(),
            bitrate: default_bitrate(),
            max_recording_time_ms: default_recording_time_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_image_max_size_mb() -> f64 {
    1.0
}

fn default_video_max_size_mb() -> f64 {
    50.0
}

fn default_ceiling_mb() -> f64 {
    50.0
}

fn default_quality() -> f32 {
    0.8
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

fn default_bitrate() -> u64 {
    1_000_000
}

fn default_recording_time_ms() -> u64 {
    30_000
}

fn default_load_timeout_ms() -> u64 {
    20_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let config = Config::default();
        assert_eq!(
            config.image.to_compression_config(),
            CompressionConfig::image_defaults()
        );
        assert_eq!(
            config.video.to_compression_config(),
            CompressionConfig::video_defaults()
        );
        assert_eq!(config.video.timeouts(), PipelineTimeouts::default());
        assert_eq!(
            config.converter.to_conversion_config(),
            ConversionConfig::default()
        );
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: Config = toml::from_str("[video]\nmax_size_mb = 20.0\n").unwrap();
        assert_eq!(config.video.max_size_mb, 20.0);
        assert_eq!(config.video.load_timeout_ms, 20_000);
        assert_eq!(config.image, ImageSettings::default());
    }
}
