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

//! Video compression with a single resolution/bitrate backoff
//!
//! The compressor picks an initial bitrate and scale from the source size
//! (see [`policy`](crate::policy)), records one attempt through the host,
//! and if the output is still over budget records exactly one more at half
//! the bitrate and a reduced resolution. Whatever the retry produces is
//! final.
//!
//! # Example
//!
//! ```rust,no_run
//! use mediaprep_media::mock::MockVideoHost;
//! use mediaprep_media::{CompressionConfig, MediaBlob, VideoCompressor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let host = Arc::new(MockVideoHost::new());
//! let compressor = VideoCompressor::new(host, CompressionConfig::video_defaults())?;
//!
//! let blob = MediaBlob::from_path("clip.mp4").await?;
//! let outcome = compressor.compress(blob, &CancellationToken::new()).await?;
//! println!("{} attempts, budget met: {}", outcome.attempts.len(), outcome.budget_met);
//! # Ok(())
//! # }
//! ```

use crate::attempt::{CompressionOutcome, MAX_RETRY_DEPTH};
use crate::blob::MediaBlob;
use crate::codec::CodecChoice;
use crate::config::{CompressionConfig, DEFAULT_LOAD_TIMEOUT};
use crate::error::{MediaError, Result, Stage};
use crate::host::VideoHost;
use crate::pipeline::{run_attempt, AttemptRequest};
use crate::policy::{plan_for, VideoPlan};
use crate::size_gate::{Gated, SizeGate};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Capture-encode compressor driven by a [`VideoHost`]
#[derive(Debug, Clone)]
pub struct VideoCompressor {
    host: Arc<dyn VideoHost>,
    config: CompressionConfig,
    gate: SizeGate,
    load_timeout: Duration,
    chain: CodecChoice,
}

impl VideoCompressor {
    /// Create a compressor over `host`; the configuration is validated up front
    pub fn new(host: Arc<dyn VideoHost>, config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        let gate = SizeGate::new(config.max_size_bytes)?;
        Ok(VideoCompressor {
            host,
            config,
            gate,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            chain: CodecChoice::compression_chain(),
        })
    }

    /// Override the source load bound
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Result<Self> {
        if load_timeout.is_zero() {
            return Err(MediaError::invalid_config("load timeout must be non-zero"));
        }
        self.load_timeout = load_timeout;
        Ok(self)
    }

    /// Override the codec fallback chain
    pub fn with_codec_choice(mut self, chain: CodecChoice) -> Self {
        self.chain = chain;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Plan the compressor would use for a source of `source_bytes`
    pub fn plan(&self, source_bytes: u64) -> VideoPlan {
        plan_for(source_bytes, &self.config)
    }

    /// Compress `blob` below the budget.
    ///
    /// Sources within budget are returned unchanged without touching the host.
    #[instrument(skip(self, blob, token), fields(input_bytes = blob.len(), budget = self.config.max_size_bytes))]
    pub async fn compress(
        &self,
        blob: MediaBlob,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        let blob = match self.gate.gate(blob) {
            Gated::Within(blob) => {
                debug!("video already within budget");
                return Ok(CompressionOutcome::passthrough(blob));
            }
            Gated::Exceeds { blob, excess_bytes } => {
                debug!(excess_bytes, "video over budget, compressing");
                blob
            }
        };
        self.record_over_budget(&blob, token).await
    }

    /// Run the attempt chain for a source already known to exceed the budget.
    ///
    /// The source is only borrowed, so a caller can still hand it to another
    /// strategy when this one fails.
    pub(crate) async fn record_over_budget(
        &self,
        blob: &MediaBlob,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        let plan = self.plan(blob.len());
        info!(
            band = %plan.band,
            bitrate = plan.initial.bitrate_bps,
            scale = plan.initial.scale,
            "compressing video"
        );

        let mut attempts = Vec::new();
        for depth in 0..=MAX_RETRY_DEPTH {
            let request = AttemptRequest {
                retry_depth: depth,
                plan: plan.at_depth(depth),
                max_width: self.config.max_width,
                max_height: self.config.max_height,
                max_duration: self.config.max_duration,
                load_timeout: self.load_timeout,
                chain: &self.chain,
            };
            let recorded = run_attempt(&self.host, blob, request, token).await?;
            let size = recorded.blob.len();
            let fits = self.gate.fits(size);
            let may_retry = recorded.attempt.may_retry();
            debug!(
                depth,
                size,
                frames = recorded.frames,
                stop = ?recorded.stop,
                "video attempt finished"
            );
            attempts.push(recorded.attempt);

            if fits || !may_retry {
                if !fits {
                    warn!(
                        size,
                        budget = self.gate.max_size_bytes(),
                        "retry still over budget; keeping best effort"
                    );
                }
                info!(output_bytes = size, attempts = attempts.len(), budget_met = fits, "video compressed");
                return Ok(CompressionOutcome {
                    blob: recorded.blob,
                    attempts,
                    budget_met: fits,
                });
            }

            warn!(
                size,
                budget = self.gate.max_size_bytes(),
                "output over budget; retrying at reduced resolution and bitrate"
            );
        }

        // The final depth never retries, so the loop always returns.
        Err(MediaError::encode_failure(
            Stage::Finalizing,
            "retry chain ended without output",
        ))
    }
}

/// Compress a video through `host`, returning only the final blob.
///
/// Rejects on an unsupported codec, a load timeout, or an encode failure.
pub async fn compress_video(
    host: Arc<dyn VideoHost>,
    blob: MediaBlob,
    config: &CompressionConfig,
    token: &CancellationToken,
) -> Result<MediaBlob> {
    let compressor = VideoCompressor::new(host, config.clone())?;
    Ok(compressor.compress(blob, token).await?.blob)
}
