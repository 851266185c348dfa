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

//! Single entry point for the upload layer
//!
//! [`MediaProcessor`] owns the video host and the pipeline bounds, and
//! routes each blob to the right compressor. Callers hand it a blob and a
//! configuration and get back a processed blob or a typed error.

use crate::attempt::CompressionOutcome;
use crate::blob::{MediaBlob, MediaKind};
use crate::codec::{CodecChoice, CodecNegotiator};
use crate::config::{CompressionConfig, DEFAULT_LOAD_TIMEOUT};
use crate::convert::{ConversionConfig, VideoFormatConverter};
use crate::error::{MediaError, Result, Stage};
use crate::host::VideoHost;
use crate::image::ImageCompressor;
use crate::video::VideoCompressor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Bounds on host suspension points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimeouts {
    /// Bound on loading a video source
    #[serde(with = "crate::config::duration_ms")]
    pub load: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        PipelineTimeouts {
            load: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

/// Routes blobs to the image compressor, the video compressor, or the
/// format converter
#[derive(Debug, Clone)]
pub struct MediaProcessor {
    host: Arc<dyn VideoHost>,
    timeouts: PipelineTimeouts,
    conversion: ConversionConfig,
}

impl MediaProcessor {
    /// Create a processor over `host` with default bounds
    pub fn new(host: Arc<dyn VideoHost>) -> Self {
        MediaProcessor {
            host,
            timeouts: PipelineTimeouts::default(),
            conversion: ConversionConfig::default(),
        }
    }

    /// Override suspension bounds
    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Result<Self> {
        if timeouts.load.is_zero() {
            return Err(MediaError::invalid_config("load timeout must be non-zero"));
        }
        self.timeouts = timeouts;
        Ok(self)
    }

    /// Override converter parameters
    pub fn with_conversion(mut self, conversion: ConversionConfig) -> Result<Self> {
        conversion.validate()?;
        self.conversion = conversion;
        Ok(self)
    }

    /// Suspension bounds in use
    pub fn timeouts(&self) -> PipelineTimeouts {
        self.timeouts
    }

    /// Compress a still image below `config.max_size_bytes`
    pub async fn compress_image(
        &self,
        blob: MediaBlob,
        config: &CompressionConfig,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        ImageCompressor::new(config.clone())?
            .compress(blob, token)
            .await
    }

    /// Compress a video below `config.max_size_bytes`
    pub async fn compress_video(
        &self,
        blob: MediaBlob,
        config: &CompressionConfig,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        self.video_compressor(config)?.compress(blob, token).await
    }

    /// Re-encode a video into a playback-safe container
    pub async fn try_convert_video(
        &self,
        blob: MediaBlob,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        VideoFormatConverter::new(Arc::clone(&self.host), self.conversion.clone())?
            .with_load_timeout(self.timeouts.load)?
            .convert(blob, token)
            .await
    }

    /// Compress a video, falling back to the converter once if the source
    /// cannot be loaded.
    ///
    /// A runtime that supports none of the compression codecs is rejected
    /// up front; no fallback can fix that.
    #[instrument(skip(self, blob, config, token), fields(input_bytes = blob.len()))]
    pub async fn prepare_video(
        &self,
        blob: MediaBlob,
        config: &CompressionConfig,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        let compressor = self.video_compressor(config)?;
        if blob.len() <= config.max_size_bytes {
            return compressor.compress(blob, token).await;
        }
        CodecNegotiator::new(&*self.host).negotiate(&CodecChoice::compression_chain())?;

        let result = compressor.record_over_budget(&blob, token).await;
        match result {
            Err(e) if falls_back_to_converter(&e) => {
                warn!(error = %e, "source could not be loaded; converting instead");
                self.try_convert_video(blob, token).await
            }
            other => other,
        }
    }

    /// Process blobs one after another.
    ///
    /// Results come back in input order. Once `token` is cancelled, the
    /// items not yet started settle as `Cancelled` without touching the host.
    pub async fn process_batch(
        &self,
        blobs: Vec<MediaBlob>,
        image_config: &CompressionConfig,
        video_config: &CompressionConfig,
        token: &CancellationToken,
    ) -> Vec<Result<CompressionOutcome>> {
        let total = blobs.len();
        let mut results = Vec::with_capacity(total);

        for (index, blob) in blobs.into_iter().enumerate() {
            if token.is_cancelled() {
                results.push(Err(MediaError::Cancelled));
                continue;
            }
            debug!(index, total, mime = blob.mime_type(), "processing batch item");
            let result = match blob.kind() {
                MediaKind::Image => self.compress_image(blob, image_config, token).await,
                MediaKind::Video => self.prepare_video(blob, video_config, token).await,
                MediaKind::Other => Err(MediaError::unsupported(format!(
                    "{} is neither an image nor a video",
                    blob.mime_type()
                ))),
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        info!(total, succeeded, "batch finished");
        results
    }

    fn video_compressor(&self, config: &CompressionConfig) -> Result<VideoCompressor> {
        VideoCompressor::new(Arc::clone(&self.host), config.clone())?
            .with_load_timeout(self.timeouts.load)
    }
}

/// Only refusals and timeouts raised while loading the source fall back;
/// a recorder refusing its target after the source loaded does not.
fn falls_back_to_converter(error: &MediaError) -> bool {
    matches!(
        error,
        MediaError::LoadTimeout { .. } | MediaError::UnsupportedFormat { .. }
    ) && error.stage() == Some(Stage::LoadingSource)
}
