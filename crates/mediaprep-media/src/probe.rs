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

//! MP4 metadata probe
//!
//! Reads the MP4 box structure to recover the dimensions, duration and
//! audio presence a host would report after loading the source. Useful for
//! planning a compression without a video runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use mediaprep_media::probe::Mp4Probe;
//!
//! # fn example() -> anyhow::Result<()> {
//! let data = std::fs::read("clip.mp4")?;
//! let metadata = Mp4Probe::new().probe(&data)?;
//! println!("{}x{}, {:?}", metadata.width, metadata.height, metadata.duration);
//! # Ok(())
//! # }
//! ```

use crate::error::{MediaError, Result};
use crate::host::VideoMetadata;
use mp4parse::{read_mp4, MediaContext, SampleEntry, Track, TrackType};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, instrument};

/// Extracts [`VideoMetadata`] from MP4 bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp4Probe;

impl Mp4Probe {
    /// Create a probe
    pub fn new() -> Self {
        Mp4Probe
    }

    /// Parse `data` and describe its first video track
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub fn probe(&self, data: &[u8]) -> Result<VideoMetadata> {
        let mut cursor = Cursor::new(data);
        let context = read_mp4(&mut cursor)
            .map_err(|e| MediaError::unsupported(format!("cannot parse MP4: {:?}", e)))?;
        Self::describe(&context)
    }

    fn describe(context: &MediaContext) -> Result<VideoMetadata> {
        let video = context
            .tracks
            .iter()
            .find(|t| t.track_type == TrackType::Video)
            .ok_or_else(|| MediaError::unsupported("MP4 has no video track"))?;

        let (width, height) = Self::dimensions(video);
        let duration = context
            .tracks
            .iter()
            .filter_map(Self::track_duration)
            .max()
            .unwrap_or_default();
        let has_audio = context
            .tracks
            .iter()
            .any(|t| t.track_type == TrackType::Audio);

        debug!(width, height, ?duration, has_audio, "probed MP4");
        Ok(VideoMetadata {
            width,
            height,
            duration,
            has_audio,
        })
    }

    fn dimensions(track: &Track) -> (u32, u32) {
        let from_sample_entry = track
            .stsd
            .as_ref()
            .and_then(|stsd| stsd.descriptions.first())
            .and_then(|entry| match entry {
                SampleEntry::Video(video) => {
                    Some((u32::from(video.width), u32::from(video.height)))
                }
                _ => None,
            });

        // Track header dimensions are 16.16 fixed point
        from_sample_entry
            .or_else(|| track.tkhd.as_ref().map(|tkhd| (tkhd.width >> 16, tkhd.height >> 16)))
            .unwrap_or((0, 0))
    }

    fn track_duration(track: &Track) -> Option<Duration> {
        let timescale = track.timescale?.0;
        if timescale == 0 {
            return None;
        }
        let ticks = track.duration?.0;
        Some(Duration::from_secs_f64(ticks as f64 / timescale as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mediaprep_test_utils::TestFixtures;

    #[test]
    fn garbage_is_unsupported() {
        let err = Mp4Probe::new().probe(b"not an mp4 at all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn empty_input_is_unsupported() {
        assert!(Mp4Probe::new().probe(&[]).is_err());
    }

    #[test]
    fn reads_video_track_header() {
        let data = TestFixtures::mp4(1280, 720, 12_500, true);
        let metadata = Mp4Probe::new().probe(&data).unwrap();
        assert_eq!((metadata.width, metadata.height), (1280, 720));
        assert_eq!(metadata.duration, Duration::from_millis(12_500));
        assert!(metadata.has_audio);
    }

    #[test]
    fn silent_clip_has_no_audio() {
        let data = TestFixtures::mp4(640, 480, 3_000, false);
        let metadata = Mp4Probe::new().probe(&data).unwrap();
        assert!(!metadata.has_audio);
        assert_eq!(metadata.width, 640);
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let data = TestFixtures::mp4_of_size(320, 240, 1_000, 64 * 1024);
        assert!(data.len() >= 64 * 1024);
        assert_eq!(Mp4Probe::new().probe(&data).unwrap().height, 240);
    }
}
