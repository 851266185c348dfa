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

//! Video runtime abstraction
//!
//! The video pipeline never decodes or encodes video itself. It drives a
//! [`VideoHost`]: something that can hand out playable-buffer URLs for a
//! blob, report metadata, decode frames, and record painted frames with a
//! given codec. A browser binding, an FFmpeg binding, or the in-memory
//! [`MockVideoHost`](crate::mock::MockVideoHost) all fit behind it.
//!
//! # Implementing a host
//!
//! 1. Use `#[async_trait]` on the impl block
//! 2. Keep `create_object_url`/`revoke_object_url` cheap and infallible;
//!    the pipeline revokes every URL it creates exactly once
//! 3. `load_metadata` may hang; the pipeline bounds it with a timeout
//! 4. Return `MediaError::UnsupportedFormat` for sources you refuse to decode

use crate::blob::MediaBlob;
use crate::codec::{CodecCandidate, CodecSupport};
use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::Duration;

/// Temporary playable-buffer handle for a blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    /// Wrap a host-issued URL
    pub fn new(url: impl Into<String>) -> Self {
        ObjectUrl(url.into())
    }

    /// URL text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source metadata, available once the source is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Display width
    pub width: u32,
    /// Display height
    pub height: u32,
    /// Playback duration
    pub duration: Duration,
    /// Whether an audio track is exposed
    pub has_audio: bool,
}

/// A decoded frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation time from the start of the source
    pub timestamp: Duration,
    /// Decoded pixels
    pub image: DynamicImage,
}

/// Opaque audio track carried from source to recorder untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    /// Host-specific track identifier
    pub id: String,
}

/// Encoder parameters for one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderSettings {
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Video bitrate
    pub bitrate_bps: u64,
}

/// Frame-by-frame decoder for an opened source
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of playback
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Audio track, if the source exposes one. Taken at most once.
    fn take_audio_track(&mut self) -> Option<AudioTrack>;
}

/// Encoder fed with painted surface frames
#[async_trait]
pub trait FrameRecorder: Send {
    /// Carry an audio track into the output
    fn attach_audio(&mut self, track: AudioTrack);

    /// Encode one painted frame
    async fn write_frame(&mut self, timestamp: Duration, pixels: &image::RgbImage) -> Result<()>;

    /// Flush and return the encoded blob
    async fn stop(self: Box<Self>) -> Result<MediaBlob>;
}

/// Video runtime driven by the compression pipeline
#[async_trait]
pub trait VideoHost: CodecSupport + Send + Sync + Debug {
    /// Allocate a playable-buffer URL for `blob`
    fn create_object_url(&self, blob: &MediaBlob) -> ObjectUrl;

    /// Release a URL from `create_object_url`
    fn revoke_object_url(&self, url: &ObjectUrl);

    /// Open the source for metadata only
    async fn load_metadata(&self, url: &ObjectUrl) -> Result<VideoMetadata>;

    /// Open the source for frame-by-frame playback
    async fn open_source(&self, url: &ObjectUrl) -> Result<Box<dyn FrameSource>>;

    /// Start a recorder for the negotiated target
    fn create_recorder(
        &self,
        target: &CodecCandidate,
        settings: &RecorderSettings,
    ) -> Result<Box<dyn FrameRecorder>>;
}
