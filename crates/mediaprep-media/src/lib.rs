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

//! Media compression before upload
//!
//! This crate provides:
//! - A size gate that passes media already within budget through untouched
//! - Iterative JPEG quality reduction for still images
//! - Codec negotiation with an ordered fallback chain
//! - Capture-encode video compression with one bounded backoff retry
//! - Fixed-bitrate conversion into a playback-safe container
//! - Release-exactly-once tracking of transient handles
//!
//! # Architecture
//!
//! Images are handled entirely in-process with the `image` crate. Video
//! work is delegated to a [`VideoHost`]: the pipeline opens a source
//! through it, paints each decoded frame onto a [`RasterSurface`], and
//! feeds the surface to a host recorder. Every stage that may take a
//! while is a cancellable suspension point driven by a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! # Example
//!
//! ```rust,no_run
//! use mediaprep_media::mock::MockVideoHost;
//! use mediaprep_media::{CompressionConfig, MediaBlob, MediaProcessor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let processor = MediaProcessor::new(Arc::new(MockVideoHost::new()));
//! let token = CancellationToken::new();
//!
//! let photo = MediaBlob::from_path("photo.png").await?;
//! let outcome = processor
//!     .compress_image(photo, &CompressionConfig::image_defaults(), &token)
//!     .await?;
//! println!("{} bytes", outcome.blob.len());
//! # Ok(())
//! # }
//! ```

pub mod attempt;
pub mod blob;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod host;
pub mod image;
pub mod mock;
mod pipeline;
pub mod policy;
pub mod probe;
pub mod processor;
pub mod raster;
pub mod resources;
pub mod size_gate;
pub mod video;

// Re-export commonly used types
pub use attempt::{AttemptState, CompressionOutcome, EncodeSetting, ProcessingAttempt};
pub use blob::{MediaBlob, MediaKind};
pub use codec::{CodecCandidate, CodecChoice, CodecNegotiator, CodecSupport};
pub use config::CompressionConfig;
pub use convert::{try_convert_video, ConversionConfig, VideoFormatConverter};
pub use error::{ErrorKind, MediaError, Result, Stage};
pub use host::{VideoHost, VideoMetadata};
pub use image::{compress_image, ImageCompressor};
pub use policy::{SizeBand, VideoPlan};
pub use probe::Mp4Probe;
pub use processor::{MediaProcessor, PipelineTimeouts};
pub use raster::RasterSurface;
pub use resources::{ResourceKind, ResourceTracker};
pub use size_gate::{Gated, SizeGate};
pub use video::{compress_video, VideoCompressor};
