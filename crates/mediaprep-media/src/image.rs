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

//! Still-image compression below a byte budget
//!
//! The source is decoded, downscaled once to fit the bounding box, painted
//! onto a [`RasterSurface`], then JPEG-encoded at decreasing quality until it
//! fits the budget or the quality floor is reached. Reaching the floor over
//! budget is not an error: the smallest encode is returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use mediaprep_media::{CompressionConfig, ImageCompressor, MediaBlob};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let blob = MediaBlob::from_path("photo.jpg").await?;
//! let compressor = ImageCompressor::new(CompressionConfig::image_defaults())?;
//! let outcome = compressor.compress(blob, &CancellationToken::new()).await?;
//!
//! println!("{} bytes after {} encodes", outcome.blob.len(), outcome.attempts.len());
//! # Ok(())
//! # }
//! ```

use crate::attempt::{suspend, CompressionOutcome, ProcessingAttempt};
use crate::blob::MediaBlob;
use crate::config::CompressionConfig;
use crate::error::{MediaError, Result, Stage};
use crate::raster::{fit_within, RasterSurface};
use crate::size_gate::{Gated, SizeGate};
use image::DynamicImage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Quality decrement per step, in percent
pub const QUALITY_STEP: u8 = 10;
/// Lowest quality tried, in percent
pub const QUALITY_FLOOR: u8 = 10;

/// MIME type of every re-encoded image
pub const OUTPUT_MIME: &str = "image/jpeg";

/// Iterative quality/resolution reducer for still images
#[derive(Debug, Clone)]
pub struct ImageCompressor {
    config: CompressionConfig,
    gate: SizeGate,
}

impl ImageCompressor {
    /// Create a compressor; the configuration is validated up front
    pub fn new(config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        let gate = SizeGate::new(config.max_size_bytes)?;
        Ok(ImageCompressor { config, gate })
    }

    /// Configuration in use
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Upper bound on encode attempts for the configured quality
    pub fn max_encode_attempts(&self) -> usize {
        let initial = quality_percent(self.config.quality);
        usize::from(initial.saturating_sub(QUALITY_FLOOR) / QUALITY_STEP) + 1
    }

    /// Compress `blob` below the budget, returning the attempt chain
    #[instrument(skip(self, blob, token), fields(input_bytes = blob.len(), budget = self.config.max_size_bytes))]
    pub async fn compress(
        &self,
        blob: MediaBlob,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        let blob = match self.gate.gate(blob) {
            Gated::Within(blob) => {
                debug!("image already within budget");
                return Ok(CompressionOutcome::passthrough(blob));
            }
            Gated::Exceeds { blob, excess_bytes } => {
                debug!(excess_bytes, "image over budget, compressing");
                blob
            }
        };

        let data = blob.into_bytes();
        let decoded = suspend(
            token,
            Stage::LoadingSource,
            None,
            blocking(Stage::LoadingSource, move || decode(&data)),
        )
        .await?;

        let (source_w, source_h) = (decoded.width(), decoded.height());
        let (width, height) =
            fit_within(source_w, source_h, self.config.max_width, self.config.max_height);
        if (width, height) != (source_w, source_h) {
            debug!(source_w, source_h, width, height, "downscaling to fit bounding box");
        }

        let mut surface = RasterSurface::allocate(width, height)?;
        let surface = suspend(
            token,
            Stage::Rendering,
            None,
            blocking(Stage::Rendering, move || {
                surface.paint(&decoded);
                Ok(surface)
            }),
        )
        .await?;

        self.quality_search(Arc::new(surface), token).await
    }

    async fn quality_search(
        &self,
        surface: Arc<RasterSurface>,
        token: &CancellationToken,
    ) -> Result<CompressionOutcome> {
        let (width, height) = (surface.width(), surface.height());
        let mut quality = quality_percent(self.config.quality);
        let mut attempts: Vec<ProcessingAttempt> = Vec::new();
        let mut best: Option<Vec<u8>> = None;

        loop {
            let encoded = {
                let surface = Arc::clone(&surface);
                suspend(
                    token,
                    Stage::Encoding,
                    None,
                    blocking(Stage::Encoding, move || surface.encode_jpeg(quality)),
                )
                .await?
            };
            let size = encoded.len() as u64;

            attempts.push(ProcessingAttempt::ladder(
                u8::try_from(attempts.len()).unwrap_or(u8::MAX),
                width,
                height,
                f32::from(quality) / 100.0,
                size,
            ));
            debug!(quality, size, "encoded image");

            if best.as_ref().map_or(true, |b| size < b.len() as u64) {
                best = Some(encoded);
            }

            if self.gate.fits(size) {
                break;
            }
            if quality < QUALITY_FLOOR + QUALITY_STEP {
                warn!(
                    quality,
                    size,
                    budget = self.gate.max_size_bytes(),
                    "quality floor reached over budget; keeping best effort"
                );
                break;
            }
            quality -= QUALITY_STEP;
        }

        let data = best.ok_or_else(|| {
            MediaError::encode_failure(Stage::Encoding, "quality search produced no output")
        })?;
        let budget_met = self.gate.fits(data.len() as u64);
        info!(
            output_bytes = data.len(),
            encodes = attempts.len(),
            width,
            height,
            budget_met,
            "image compressed"
        );

        Ok(CompressionOutcome {
            blob: MediaBlob::new(data, OUTPUT_MIME),
            attempts,
            budget_met,
        })
    }
}

/// Compress an image with `config`, returning only the final blob.
///
/// Fails only on unrecoverable decode/encode errors or cancellation, never
/// because the budget could not be reached.
pub async fn compress_image(
    blob: MediaBlob,
    config: &CompressionConfig,
    token: &CancellationToken,
) -> Result<MediaBlob> {
    let compressor = ImageCompressor::new(config.clone())?;
    Ok(compressor.compress(blob, token).await?.blob)
}

/// Convert a (0, 1] quality to the encoder's 1-100 scale
pub fn quality_percent(quality: f32) -> u8 {
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

fn decode(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data)
        .map_err(|e| MediaError::unsupported(format!("cannot decode image: {}", e)))
}

async fn blocking<T, F>(stage: Stage, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MediaError::encode_failure(stage, format!("worker task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_of(width: u32, height: u32) -> MediaBlob {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 251;
            Rgb([noise as u8, (x % 256) as u8, (y % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        MediaBlob::new(out.into_inner(), "image/png")
    }

    #[test]
    fn quality_conversion() {
        assert_eq!(quality_percent(0.8), 80);
        assert_eq!(quality_percent(0.9), 90);
        assert_eq!(quality_percent(7.0), 100);
    }

    #[test]
    fn attempt_bound_matches_quality_ladder() {
        let at = |q: f32| {
            ImageCompressor::new(CompressionConfig::image_defaults().with_quality(q))
                .unwrap()
                .max_encode_attempts()
        };
        assert_eq!(at(0.9), 9);
        assert_eq!(at(0.8), 8);
        assert_eq!(at(0.1), 1);
    }

    #[tokio::test]
    async fn under_budget_is_untouched() {
        let blob = png_of(16, 16);
        let original = blob.clone();
        let outcome = ImageCompressor::new(CompressionConfig::image_defaults())
            .unwrap()
            .compress(blob, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.was_reencoded());
        assert_eq!(outcome.blob, original);
    }

    #[tokio::test]
    async fn unreachable_budget_degrades_gracefully() {
        let config = CompressionConfig::image_defaults()
            .with_max_size_bytes(64)
            .with_quality(0.5);
        let compressor = ImageCompressor::new(config).unwrap();
        let outcome = compressor
            .compress(png_of(96, 64), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.budget_unreachable());
        assert_eq!(outcome.attempts.len(), compressor.max_encode_attempts());
        assert_eq!(outcome.blob.mime_type(), OUTPUT_MIME);
        let smallest = outcome
            .attempts
            .iter()
            .filter_map(|a| a.output_bytes)
            .min()
            .unwrap();
        assert_eq!(outcome.blob.len(), smallest);
    }

    #[tokio::test]
    async fn ladder_steps_are_not_retries() {
        let config = CompressionConfig::image_defaults()
            .with_max_size_bytes(64)
            .with_quality(0.5);
        let outcome = ImageCompressor::new(config)
            .unwrap()
            .compress(png_of(64, 48), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.attempts.len() > 1);
        for (i, attempt) in outcome.attempts.iter().enumerate() {
            assert_eq!(attempt.retry_depth, 0);
            assert_eq!(usize::from(attempt.ladder_step), i);
        }
    }

    #[tokio::test]
    async fn garbage_input_is_unsupported() {
        let config = CompressionConfig::image_defaults().with_max_size_bytes(4);
        let err = compress_image(
            MediaBlob::new(b"definitely not an image".to_vec(), "image/jpeg"),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let config = CompressionConfig::image_defaults().with_max_size_bytes(16);
        let err = compress_image(png_of(32, 32), &config, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
