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

//! Owned media buffers passed between pipeline stages

use crate::error::{MediaError, Result};
use image::ImageFormat;
use std::fmt;
use std::path::Path;

/// Media family, derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// Anything else
    Other,
}

/// Immutable encoded media buffer with its declared MIME type.
///
/// A blob is owned by exactly one stage at a time; stages take it by value
/// and hand back either the same blob or a freshly encoded one.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    data: Vec<u8>,
    mime_type: String,
}

impl MediaBlob {
    /// Wrap encoded bytes
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        MediaBlob {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Read a file, guessing the MIME type from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_from_path(path).ok_or_else(|| {
            MediaError::unsupported(format!("cannot infer media type of {}", path.display()))
        })?;
        let data = tokio::fs::read(path).await?;
        Ok(MediaBlob::new(data, mime_type))
    }

    /// Byte length
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Declared MIME type, parameters included
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give up ownership of the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Media family of the declared type
    pub fn kind(&self) -> MediaKind {
        let essence = self.mime_type.split(';').next().unwrap_or("").trim();
        if essence.starts_with("image/") {
            MediaKind::Image
        } else if essence.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Guess a MIME type from a file extension
pub fn mime_from_path(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if let Some(format) = ImageFormat::from_extension(&ext) {
        return Some(format.to_mime_type().to_string());
    }
    let video = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(video.to_string())
}

/// File extension conventionally used for a MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or("").trim() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ignores_codec_parameters() {
        let blob = MediaBlob::new(vec![1, 2, 3], "video/webm;codecs=vp9,opus");
        assert_eq!(blob.kind(), MediaKind::Video);
        assert_eq!(blob.len(), 3);
        assert_eq!(MediaBlob::new(vec![], "image/png").kind(), MediaKind::Image);
        assert_eq!(
            MediaBlob::new(vec![], "application/pdf").kind(),
            MediaKind::Other
        );
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(
            mime_from_path(Path::new("a/photo.JPG")).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            mime_from_path(Path::new("clip.mov")).as_deref(),
            Some("video/quicktime")
        );
        assert_eq!(mime_from_path(Path::new("notes.txt")), None);
        assert_eq!(mime_from_path(Path::new("README")), None);
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let blob = MediaBlob::new(vec![0xAB; 4096], "image/jpeg");
        let printed = format!("{:?}", blob);
        assert!(printed.contains("4096"));
        assert!(!printed.contains("171"));
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for_mime("video/webm;codecs=vp8"), "webm");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
    }
}
