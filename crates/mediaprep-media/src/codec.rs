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

//! Codec negotiation with an ordered fallback chain

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// One container + codec combination the host may support
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecCandidate {
    /// Container MIME essence, e.g. `video/webm`
    pub container: String,
    /// Video codec, `None` for a container-only baseline
    pub video_codec: Option<String>,
    /// Audio codec paired with the video codec
    pub audio_codec: Option<String>,
}

impl CodecCandidate {
    /// Candidate with an explicit video/audio codec pair
    pub fn new(container: &str, video_codec: &str, audio_codec: &str) -> Self {
        CodecCandidate {
            container: container.to_string(),
            video_codec: Some(video_codec.to_string()),
            audio_codec: Some(audio_codec.to_string()),
        }
    }

    /// Container-only candidate; the host picks the codecs
    pub fn baseline(container: &str) -> Self {
        CodecCandidate {
            container: container.to_string(),
            video_codec: None,
            audio_codec: None,
        }
    }

    /// Full MIME type used to probe the host, e.g. `video/webm;codecs=vp9,opus`
    pub fn mime_type(&self) -> String {
        let codecs: Vec<&str> = self
            .video_codec
            .iter()
            .chain(self.audio_codec.iter())
            .map(String::as_str)
            .collect();
        if codecs.is_empty() {
            self.container.clone()
        } else {
            format!("{};codecs={}", self.container, codecs.join(","))
        }
    }
}

impl fmt::Display for CodecCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type())
    }
}

/// Ordered candidate list; the first supported entry wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecChoice {
    candidates: Vec<CodecCandidate>,
}

impl CodecChoice {
    /// Build from an explicit priority order
    pub fn new(candidates: Vec<CodecCandidate>) -> Self {
        CodecChoice { candidates }
    }

    /// Compression chain: VP9 → VP8 → plain WebM
    pub fn compression_chain() -> Self {
        CodecChoice::new(vec![
            CodecCandidate::new("video/webm", "vp9", "opus"),
            CodecCandidate::new("video/webm", "vp8", "opus"),
            CodecCandidate::baseline("video/webm"),
        ])
    }

    /// Playback-safe chain for format conversion: H.264 MP4 → VP8 → plain WebM
    pub fn conversion_chain() -> Self {
        CodecChoice::new(vec![
            CodecCandidate::new("video/mp4", "avc1", "mp4a"),
            CodecCandidate::new("video/webm", "vp8", "opus"),
            CodecCandidate::baseline("video/webm"),
        ])
    }

    /// Candidates in priority order
    pub fn candidates(&self) -> &[CodecCandidate] {
        &self.candidates
    }
}

/// Runtime support probe
pub trait CodecSupport {
    /// Whether the runtime can record to this full MIME type
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

/// Picks the first candidate the runtime supports
pub struct CodecNegotiator<'a, S: CodecSupport + ?Sized> {
    support: &'a S,
}

impl<'a, S: CodecSupport + ?Sized> CodecNegotiator<'a, S> {
    /// Negotiate against a support probe
    pub fn new(support: &'a S) -> Self {
        CodecNegotiator { support }
    }

    /// Resolve `choice` to its first supported candidate.
    ///
    /// No supported candidate is terminal: no backoff can fix it.
    pub fn negotiate(&self, choice: &CodecChoice) -> Result<CodecCandidate> {
        for candidate in choice.candidates() {
            let mime = candidate.mime_type();
            if self.support.is_type_supported(&mime) {
                debug!(%mime, "negotiated encoding target");
                return Ok(candidate.clone());
            }
            debug!(%mime, "encoding target not supported");
        }
        warn!(
            tried = choice.candidates().len(),
            "no supported encoding target"
        );
        Err(MediaError::unsupported("no supported encoding target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    struct Supports(HashSet<&'static str>);

    impl CodecSupport for Supports {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.0.contains(mime_type)
        }
    }

    #[test]
    fn mime_formatting() {
        assert_eq!(
            CodecCandidate::new("video/webm", "vp9", "opus").mime_type(),
            "video/webm;codecs=vp9,opus"
        );
        assert_eq!(CodecCandidate::baseline("video/webm").mime_type(), "video/webm");
    }

    #[test]
    fn first_supported_wins() {
        let host = Supports(HashSet::from(["video/webm", "video/webm;codecs=vp8,opus"]));
        let chosen = CodecNegotiator::new(&host)
            .negotiate(&CodecChoice::compression_chain())
            .unwrap();
        assert_eq!(chosen.video_codec.as_deref(), Some("vp8"));
    }

    #[test]
    fn falls_back_to_baseline() {
        let host = Supports(HashSet::from(["video/webm"]));
        let chosen = CodecNegotiator::new(&host)
            .negotiate(&CodecChoice::compression_chain())
            .unwrap();
        assert_eq!(chosen, CodecCandidate::baseline("video/webm"));
    }

    #[test]
    fn nothing_supported_is_unsupported_format() {
        let host = Supports(HashSet::new());
        let err = CodecNegotiator::new(&host)
            .negotiate(&CodecChoice::compression_chain())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn conversion_prefers_mp4() {
        let host = Supports(HashSet::from([
            "video/mp4;codecs=avc1,mp4a",
            "video/webm;codecs=vp9,opus",
        ]));
        let negotiator = CodecNegotiator::new(&host);
        assert_eq!(
            negotiator
                .negotiate(&CodecChoice::conversion_chain())
                .unwrap()
                .container,
            "video/mp4"
        );
        assert_eq!(
            negotiator
                .negotiate(&CodecChoice::compression_chain())
                .unwrap()
                .video_codec
                .as_deref(),
            Some("vp9")
        );
    }
}
