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

//! In-memory mock video host for testing
//!
//! [`MockVideoHost`] scripts everything the pipeline asks of a runtime:
//! which codec strings are supported, how metadata loading behaves, frame
//! rate and duration of the "decoded" source, and whether it has audio.
//! Frames are produced on tokio timers, so tests using paused time drive
//! the recording cap and load timeout deterministically.
//!
//! Recorded output is a zero-filled blob sized as
//! `bitrate × recorded seconds / 8`, which is enough to exercise the byte
//! budget logic.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mediaprep_media::mock::{LoadBehavior, MockVideoHost};
//! use std::time::Duration;
//!
//! let host = MockVideoHost::new()
//!     .with_duration(Duration::from_secs(90))
//!     .with_audio(true)
//!     .with_load_behavior(LoadBehavior::Hang);
//! assert_eq!(host.urls_created(), 0);
//! ```

use crate::blob::MediaBlob;
use crate::codec::{CodecCandidate, CodecChoice, CodecSupport};
use crate::error::{MediaError, Result, Stage};
use crate::host::{
    AudioTrack, FrameRecorder, FrameSource, ObjectUrl, RecorderSettings, VideoFrame, VideoHost,
    VideoMetadata,
};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How `load_metadata` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    /// Metadata is available immediately
    Ready,
    /// Metadata arrives after a delay
    Delayed(Duration),
    /// Metadata never arrives
    Hang,
    /// The first load hangs, later loads are ready
    HangOnce,
    /// The runtime refuses the source
    Fail,
}

#[derive(Default)]
struct MockState {
    urls: Mutex<HashMap<String, String>>,
    next_url: AtomicU64,
    loads: AtomicU64,
    urls_created: AtomicU64,
    urls_revoked: AtomicU64,
    recorders_created: AtomicU64,
    settings: Mutex<Vec<RecorderSettings>>,
    targets: Mutex<Vec<CodecCandidate>>,
    audio_attached: AtomicU64,
    frames_written: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`VideoHost`] for tests
#[derive(Clone)]
pub struct MockVideoHost {
    supported: HashSet<String>,
    refused_sources: HashSet<String>,
    load: LoadBehavior,
    width: u32,
    height: u32,
    duration: Duration,
    fps: u32,
    has_audio: bool,
    fail_after_frames: Option<u64>,
    reject_recorders: bool,
    state: Arc<MockState>,
}

impl MockVideoHost {
    /// A host supporting every codec in both fallback chains, with a 64x36,
    /// 10 second, 5 fps silent source
    pub fn new() -> Self {
        let supported = CodecChoice::compression_chain()
            .candidates()
            .iter()
            .chain(CodecChoice::conversion_chain().candidates())
            .map(CodecCandidate::mime_type)
            .collect();
        MockVideoHost {
            supported,
            refused_sources: HashSet::new(),
            load: LoadBehavior::Ready,
            width: 64,
            height: 36,
            duration: Duration::from_secs(10),
            fps: 5,
            has_audio: false,
            fail_after_frames: None,
            reject_recorders: false,
            state: Arc::new(MockState::default()),
        }
    }

    /// Replace the supported codec strings
    pub fn with_supported_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported = types.into_iter().map(Into::into).collect();
        self
    }

    /// Support no codec at all
    pub fn supporting_nothing(self) -> Self {
        self.with_supported_types(Vec::<String>::new())
    }

    /// Refuse to load sources with this MIME type
    pub fn refusing_source_type(mut self, mime_type: &str) -> Self {
        self.refused_sources.insert(mime_type.to_string());
        self
    }

    /// Set metadata load behaviour
    pub fn with_load_behavior(mut self, load: LoadBehavior) -> Self {
        self.load = load;
        self
    }

    /// Set source dimensions
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set source duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set source frame rate (at least 1)
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Expose an audio track
    pub fn with_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = has_audio;
        self
    }

    /// Make every recorder fail once it has written `frames` frames
    pub fn failing_after_frames(mut self, frames: u64) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }

    /// Advertise every codec but refuse to build any recorder
    pub fn rejecting_recorders(mut self) -> Self {
        self.reject_recorders = true;
        self
    }

    /// Object URLs handed out
    pub fn urls_created(&self) -> u64 {
        self.state.urls_created.load(Ordering::SeqCst)
    }

    /// Object URLs revoked
    pub fn urls_revoked(&self) -> u64 {
        self.state.urls_revoked.load(Ordering::SeqCst)
    }

    /// Object URLs still live
    pub fn live_urls(&self) -> usize {
        lock(&self.state.urls).len()
    }

    /// Metadata loads requested
    pub fn loads_attempted(&self) -> u64 {
        self.state.loads.load(Ordering::SeqCst)
    }

    /// Recorders started
    pub fn recorders_created(&self) -> u64 {
        self.state.recorders_created.load(Ordering::SeqCst)
    }

    /// Settings of every recorder, in creation order
    pub fn recorder_settings(&self) -> Vec<RecorderSettings> {
        lock(&self.state.settings).clone()
    }

    /// Negotiated targets of every recorder, in creation order
    pub fn recorded_targets(&self) -> Vec<CodecCandidate> {
        lock(&self.state.targets).clone()
    }

    /// Audio tracks attached to recorders
    pub fn audio_attached(&self) -> u64 {
        self.state.audio_attached.load(Ordering::SeqCst)
    }

    /// Frames written across all recorders
    pub fn frames_written(&self) -> u64 {
        self.state.frames_written.load(Ordering::SeqCst)
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }

    fn source_mime(&self, url: &ObjectUrl) -> Result<String> {
        lock(&self.state.urls)
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| MediaError::unsupported(format!("object url {} is not live", url)))
    }
}

impl Default for MockVideoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockVideoHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockVideoHost")
            .field("load", &self.load)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("duration", &self.duration)
            .field("fps", &self.fps)
            .field("live_urls", &self.live_urls())
            .finish()
    }
}

impl CodecSupport for MockVideoHost {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.contains(mime_type)
    }
}

#[async_trait]
impl VideoHost for MockVideoHost {
    fn create_object_url(&self, blob: &MediaBlob) -> ObjectUrl {
        let id = self.state.next_url.fetch_add(1, Ordering::SeqCst);
        let url = format!("blob:mock/{}", id);
        lock(&self.state.urls).insert(url.clone(), blob.mime_type().to_string());
        self.state.urls_created.fetch_add(1, Ordering::SeqCst);
        ObjectUrl::new(url)
    }

    fn revoke_object_url(&self, url: &ObjectUrl) {
        if lock(&self.state.urls).remove(url.as_str()).is_some() {
            self.state.urls_revoked.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn load_metadata(&self, url: &ObjectUrl) -> Result<VideoMetadata> {
        let mime = self.source_mime(url)?;
        let previous_loads = self.state.loads.fetch_add(1, Ordering::SeqCst);
        if self.refused_sources.contains(&mime) {
            return Err(MediaError::unsupported(format!("cannot play {}", mime)));
        }
        match self.load {
            LoadBehavior::Ready => {}
            LoadBehavior::Delayed(delay) => tokio::time::sleep(delay).await,
            LoadBehavior::Hang => std::future::pending::<()>().await,
            LoadBehavior::HangOnce if previous_loads == 0 => {
                std::future::pending::<()>().await
            }
            LoadBehavior::HangOnce => {}
            LoadBehavior::Fail => {
                return Err(MediaError::unsupported("source failed to load"));
            }
        }
        Ok(VideoMetadata {
            width: self.width,
            height: self.height,
            duration: self.duration,
            has_audio: self.has_audio,
        })
    }

    async fn open_source(&self, url: &ObjectUrl) -> Result<Box<dyn FrameSource>> {
        self.source_mime(url)?;
        let template = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        Ok(Box::new(MockFrameSource {
            template: DynamicImage::ImageRgb8(template),
            interval: self.frame_interval(),
            duration: self.duration,
            next: Duration::ZERO,
            audio: self.has_audio.then(|| AudioTrack {
                id: format!("{}#audio", url),
            }),
        }))
    }

    fn create_recorder(
        &self,
        target: &CodecCandidate,
        settings: &RecorderSettings,
    ) -> Result<Box<dyn FrameRecorder>> {
        if self.reject_recorders || !self.is_type_supported(&target.mime_type()) {
            return Err(MediaError::unsupported(format!(
                "recorder cannot produce {}",
                target
            )));
        }
        self.state.recorders_created.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.settings).push(settings.clone());
        lock(&self.state.targets).push(target.clone());
        Ok(Box::new(MockRecorder {
            mime_type: target.mime_type(),
            width: settings.width,
            height: settings.height,
            bitrate_bps: settings.bitrate_bps,
            fps: self.fps,
            frames: 0,
            fail_after_frames: self.fail_after_frames,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockFrameSource {
    template: DynamicImage,
    interval: Duration,
    duration: Duration,
    next: Duration,
    audio: Option<AudioTrack>,
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.next >= self.duration {
            return Ok(None);
        }
        tokio::time::sleep(self.interval).await;
        let timestamp = self.next;
        self.next += self.interval;
        Ok(Some(VideoFrame {
            timestamp,
            image: self.template.clone(),
        }))
    }

    fn take_audio_track(&mut self) -> Option<AudioTrack> {
        self.audio.take()
    }
}

struct MockRecorder {
    mime_type: String,
    width: u32,
    height: u32,
    bitrate_bps: u64,
    fps: u32,
    frames: u64,
    fail_after_frames: Option<u64>,
    state: Arc<MockState>,
}

#[async_trait]
impl FrameRecorder for MockRecorder {
    fn attach_audio(&mut self, _track: AudioTrack) {
        self.state.audio_attached.fetch_add(1, Ordering::SeqCst);
    }

    async fn write_frame(&mut self, _timestamp: Duration, pixels: &RgbImage) -> Result<()> {
        if pixels.dimensions() != (self.width, self.height) {
            return Err(MediaError::encode_failure(
                Stage::Recording,
                format!(
                    "frame is {}x{}, recorder expects {}x{}",
                    pixels.width(),
                    pixels.height(),
                    self.width,
                    self.height
                ),
            ));
        }
        if self.fail_after_frames.is_some_and(|limit| self.frames >= limit) {
            return Err(MediaError::encode_failure(
                Stage::Recording,
                "mock recorder fault",
            ));
        }
        self.frames += 1;
        self.state.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(self: Box<Self>) -> Result<MediaBlob> {
        let bits = u128::from(self.bitrate_bps) * u128::from(self.frames) / u128::from(self.fps);
        let bytes = (bits / 8).max(1) as usize;
        Ok(MediaBlob::new(vec![0u8; bytes], self.mime_type))
    }
}
