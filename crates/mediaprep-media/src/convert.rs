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

//! Re-encode into a playback-safe container
//!
//! Used when a source cannot be played back as-is. Unlike
//! [`VideoCompressor`], the converter records a single attempt at a fixed
//! conservative bitrate with no byte-budget feedback, preferring H.264 MP4.
//! Sources above the conversion ceiling are never frame-pumped here; they
//! are handed to the direct compression path instead.

use crate::attempt::CompressionOutcome;
use crate::blob::MediaBlob;
use crate::codec::CodecChoice;
use crate::config::{
    CompressionConfig, BYTES_PER_MB, DEFAULT_LOAD_TIMEOUT, DEFAULT_MAX_DURATION,
    DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH,
};
use crate::error::{MediaError, Result};
use crate::host::VideoHost;
use crate::pipeline::{run_attempt, AttemptRequest};
use crate::policy::EncodePlan;
use crate::video::VideoCompressor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Largest source the converter will frame-pump itself (50MB)
pub const CONVERSION_CEILING_BYTES: u64 = 50 * BYTES_PER_MB;
/// Fixed conversion bitrate
pub const CONVERSION_BITRATE_BPS: u64 = 1_000_000;

/// Converter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Sources above this are delegated to direct compression
    pub ceiling_bytes: u64,
    /// Fixed output bitrate
    pub bitrate_bps: u64,
    /// Recording cap
    #[serde(with = "crate::config::duration_ms")]
    pub max_duration: Duration,
    /// Output bounding box width
    pub max_width: u32,
    /// Output bounding box height
    pub max_height: u32,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            ceiling_bytes: CONVERSION_CEILING_BYTES,
            bitrate_bps: CONVERSION_BITRATE_BPS,
            max_duration: DEFAULT_MAX_DURATION,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

impl ConversionConfig {
    /// Reject zero ceilings, bitrates, caps or dimensions
    pub fn validate(&self) -> Result<()> {
        if self.ceiling_bytes == 0 {
            return Err(MediaError::invalid_config("conversion ceiling must be non-zero"));
        }
        if self.bitrate_bps == 0 {
            return Err(MediaError::invalid_config("conversion bitrate must be non-zero"));
        }
        if self.max_duration.is_zero() {
            return Err(MediaError::invalid_config(
                "conversion recording cap must be non-zero",
            ));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(MediaError::invalid_config(
                "conversion dimensions must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Fixed-bitrate re-encoder for sources the runtime refuses to play
#[derive(Debug, Clone)]
pub struct VideoFormatConverter {
    host: Arc<dyn VideoHost>,
    config: ConversionConfig,
    fallback: CompressionConfig,
    load_timeout: Duration,
    chain: CodecChoice,
}

impl VideoFormatConverter {
    /// Create a converter over `host`
    pub fn new(host: Arc<dyn VideoHost>, config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        Ok(VideoFormatConverter {
            host,
            config,
            fallback: CompressionConfig::video_defaults(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            chain: CodecChoice::conversion_chain(),
        })
    }

    /// Configuration used when an oversized source is delegated
    pub fn with_fallback(mut self, fallback: CompressionConfig) -> Result<Self> {
        fallback.validate()?;
        self.fallback = fallback;
        Ok(self)
    }

    /// Override the source load bound
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Result<Self> {
        if load_timeout.is_zero() {
            return Err(MediaError::invalid_config("load timeout must be non-zero"));
        }
        self.load_timeout = load_timeout;
        Ok(self)
    }

    /// Configuration in use
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Whether a source of `source_bytes` would be delegated
    pub fn exceeds_ceiling(&self, source_bytes: u64) -> bool {
        source_bytes > self.config.ceiling_bytes
    }

    /// Convert `blob` into a playback-safe container.
    ///
    /// `budget_met` in the outcome is always `true` for a direct conversion;
    /// no byte budget applies.
    #[instrument(skip(self, blob, token), fields(input_bytes = blob.len()))]
    pub async fn convert(
        &self,
        blob: MediaBlob,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        if self.exceeds_ceiling(blob.len()) {
            warn!(
                ceiling = self.config.ceiling_bytes,
                "source above conversion ceiling; delegating to direct compression"
            );
            let compressor = VideoCompressor::new(Arc::clone(&self.host), self.fallback.clone())?
                .with_load_timeout(self.load_timeout)?;
            return compressor.compress(blob, token).await;
        }

        let request = AttemptRequest {
            retry_depth: 0,
            plan: EncodePlan {
                bitrate_bps: self.config.bitrate_bps,
                scale: 1.0,
            },
            max_width: self.config.max_width,
            max_height: self.config.max_height,
            max_duration: self.config.max_duration,
            load_timeout: self.load_timeout,
            chain: &self.chain,
        };
        let recorded = run_attempt(&self.host, &blob, request, token).await?;
        info!(
            output_bytes = recorded.blob.len(),
            mime = recorded.blob.mime_type(),
            frames = recorded.frames,
            stop = ?recorded.stop,
            "video converted"
        );

        Ok(CompressionOutcome {
            blob: recorded.blob,
            attempts: vec![recorded.attempt],
            budget_met: true,
        })
    }
}

/// Convert a video through `host` with default conversion settings.
///
/// Rejects if no codec is supported, or if the source exceeds the ceiling
/// and the delegated direct compression also fails.
pub async fn try_convert_video(
    host: Arc<dyn VideoHost>,
    blob: MediaBlob,
    token: &CancellationToken,
) -> Result<MediaBlob> {
    let converter = VideoFormatConverter::new(host, ConversionConfig::default())?;
    Ok(converter.convert(blob, token).await?.blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_conservative() {
        let config = ConversionConfig::default();
        assert_eq!(config.bitrate_bps, 1_000_000);
        assert_eq!(config.max_duration, Duration::from_secs(30));
        assert_eq!(config.ceiling_bytes, 50 * BYTES_PER_MB);
        config.validate().unwrap();
    }

    #[test]
    fn zero_bitrate_rejected() {
        let config = ConversionConfig {
            bitrate_bps: 0,
            ..ConversionConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn ceiling_is_exclusive() {
        let converter = VideoFormatConverter::new(
            Arc::new(crate::mock::MockVideoHost::new()),
            ConversionConfig::default(),
        )
        .unwrap();
        assert!(!converter.exceeds_ceiling(CONVERSION_CEILING_BYTES));
        assert!(converter.exceeds_ceiling(CONVERSION_CEILING_BYTES + 1));
    }
}
