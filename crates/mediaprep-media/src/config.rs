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

//! Per-call compression configuration

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes in one megabyte, as the upload layer counts them
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default image budget (1MB)
pub const DEFAULT_IMAGE_MAX_MB: f64 = 1.0;
/// Default video budget (50MB)
pub const DEFAULT_VIDEO_MAX_MB: f64 = 50.0;
/// Default lossy quality
pub const DEFAULT_QUALITY: f32 = 0.8;
/// Default bounding box width
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
/// Default bounding box height
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;
/// Default video bitrate
pub const DEFAULT_TARGET_BITRATE_BPS: u64 = 1_000_000;
/// Default recording cap
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(30_000);
/// Default bound on loading a video source
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Immutable configuration for one compression call.
///
/// Image calls read `quality` and the bounding box; video calls read the
/// bitrate and recording cap (and use the bounding box as a clamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Hard upper bound the pipeline tries to reach
    pub max_size_bytes: u64,
    /// Initial lossy quality in (0.0, 1.0]
    pub quality: f32,
    /// Bounding box width
    pub max_width: u32,
    /// Bounding box height
    pub max_height: u32,
    /// Base video bitrate
    pub target_bitrate_bps: u64,
    /// Hard recording cap per attempt
    #[serde(with = "duration_ms")]
    pub max_duration: Duration,
}

impl CompressionConfig {
    /// Defaults for still images: 1MB, quality 0.8, 1920x1080
    pub fn image_defaults() -> Self {
        CompressionConfig {
            max_size_bytes: mb_to_bytes(DEFAULT_IMAGE_MAX_MB),
            quality: DEFAULT_QUALITY,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            target_bitrate_bps: DEFAULT_TARGET_BITRATE_BPS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    /// Defaults for video: 50MB, 1Mbps, 30s cap
    pub fn video_defaults() -> Self {
        CompressionConfig {
            max_size_bytes: mb_to_bytes(DEFAULT_VIDEO_MAX_MB),
            ..Self::image_defaults()
        }
    }

    /// Set the budget in megabytes
    pub fn with_max_size_mb(mut self, mb: f64) -> Self {
        self.max_size_bytes = mb_to_bytes(mb);
        self
    }

    /// Set the budget in bytes
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the initial quality
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the bounding box
    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Set the base video bitrate
    pub fn with_target_bitrate(mut self, bps: u64) -> Self {
        self.target_bitrate_bps = bps;
        self
    }

    /// Set the recording cap
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Reject configurations a compressor could loop on forever
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(MediaError::invalid_config(
                "max_size_bytes must be greater than zero",
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(MediaError::invalid_config(format!(
                "quality must be in (0.0, 1.0], got {}",
                self.quality
            )));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(MediaError::invalid_config(format!(
                "max dimensions must be non-zero, got {}x{}",
                self.max_width, self.max_height
            )));
        }
        if self.target_bitrate_bps == 0 {
            return Err(MediaError::invalid_config(
                "target_bitrate_bps must be greater than zero",
            ));
        }
        if self.max_duration.is_zero() {
            return Err(MediaError::invalid_config(
                "max_duration must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::image_defaults()
    }
}

/// Convert megabytes to bytes. Non-positive and non-finite values map to zero,
/// which `validate` rejects.
pub fn mb_to_bytes(mb: f64) -> u64 {
    if mb.is_finite() && mb > 0.0 {
        (mb * BYTES_PER_MB as f64).round() as u64
    } else {
        0
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
