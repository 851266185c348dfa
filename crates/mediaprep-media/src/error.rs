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

//! Error types for media processing operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage an error or timeout was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Decoding an image or opening a video for metadata
    LoadingSource,
    /// Painting onto the raster surface
    Rendering,
    /// Lossy encode of a still image
    Encoding,
    /// Frame pump feeding the recorder
    Recording,
    /// Flushing the recorder into a blob
    Finalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadingSource => "loading source",
            Stage::Rendering => "rendering",
            Stage::Encoding => "encoding",
            Stage::Recording => "recording",
            Stage::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Media processing errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Source cannot be decoded, or no encoding target is available
    #[error("unsupported media format: {reason}")]
    UnsupportedFormat {
        /// Stage that refused the source, when known
        stage: Option<Stage>,
        /// What was refused
        reason: String,
    },

    /// A bounded suspension point did not complete in time
    #[error("{stage} timed out after {}ms", .after.as_millis())]
    LoadTimeout {
        /// Stage that timed out
        stage: Stage,
        /// Bound that was exceeded
        after: Duration,
    },

    /// Raster or encoder failure mid-pipeline
    #[error("encode failed while {stage}: {reason}")]
    EncodeFailure {
        /// Stage that failed
        stage: Stage,
        /// Underlying cause
        reason: String,
    },

    /// Cooperative cancellation settled the call
    #[error("operation cancelled")]
    Cancelled,

    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Terminal: cannot process this file
    UnsupportedFormat,
    /// Terminal for the attempt; the converter path may be tried once
    LoadTimeout,
    /// Terminal for the attempt
    EncodeFailure,
    /// User-initiated, not shown as an error
    Cancelled,
    /// Best effort result returned over budget. Never carried by an `Err`.
    SizeBudgetUnreachable,
    /// Rejected before any work started
    InvalidConfig,
    /// Filesystem failure around the pipeline
    Io,
}

impl MediaError {
    /// Create an unsupported format error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        MediaError::UnsupportedFormat {
            stage: None,
            reason: msg.into(),
        }
    }

    /// Create an unsupported format error raised in `stage`
    pub fn unsupported_at<S: Into<String>>(stage: Stage, msg: S) -> Self {
        MediaError::UnsupportedFormat {
            stage: Some(stage),
            reason: msg.into(),
        }
    }

    /// Attribute an untagged refusal to `stage`; other errors pass through
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            MediaError::UnsupportedFormat {
                stage: None,
                reason,
            } => MediaError::UnsupportedFormat {
                stage: Some(stage),
                reason,
            },
            other => other,
        }
    }

    /// Stage the error was raised in, when known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MediaError::UnsupportedFormat { stage, .. } => *stage,
            MediaError::LoadTimeout { stage, .. } | MediaError::EncodeFailure { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Create an encode failure for a stage
    pub fn encode_failure<S: Into<String>>(stage: Stage, reason: S) -> Self {
        MediaError::EncodeFailure {
            stage,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        MediaError::InvalidConfig(msg.into())
    }

    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            MediaError::LoadTimeout { .. } => ErrorKind::LoadTimeout,
            MediaError::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            MediaError::Cancelled => ErrorKind::Cancelled,
            MediaError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            MediaError::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if this error came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Check if this is a load timeout
    pub fn is_load_timeout(&self) -> bool {
        matches!(self, MediaError::LoadTimeout { .. })
    }

    /// Whether the end user should see this error.
    ///
    /// Cancellation silently drops the in-flight attempt.
    pub fn is_user_visible(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Result type for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            MediaError::unsupported("x").kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            MediaError::encode_failure(Stage::Recording, "boom").kind(),
            ErrorKind::EncodeFailure
        );
        assert_eq!(MediaError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            MediaError::invalid_config("max").kind(),
            ErrorKind::InvalidConfig
        );
    }

    #[test]
    fn timeout_message_names_stage_and_bound() {
        let err = MediaError::LoadTimeout {
            stage: Stage::LoadingSource,
            after: Duration::from_secs(20),
        };
        assert!(err.is_load_timeout());
        assert_eq!(err.to_string(), "loading source timed out after 20000ms");
    }

    #[test]
    fn cancellation_is_not_user_visible() {
        assert!(!MediaError::Cancelled.is_user_visible());
        assert!(MediaError::unsupported("mov").is_user_visible());
    }

    #[test]
    fn refusals_take_the_first_stage_they_are_attributed_to() {
        let err = MediaError::unsupported("cannot play video/quicktime");
        assert_eq!(err.stage(), None);

        let err = err.in_stage(Stage::LoadingSource).in_stage(Stage::Recording);
        assert_eq!(err.stage(), Some(Stage::LoadingSource));
        assert_eq!(
            err.to_string(),
            "unsupported media format: cannot play video/quicktime"
        );

        let err = MediaError::Cancelled.in_stage(Stage::LoadingSource);
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::other("read failed");
        let err = MediaError::from(io_err);
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
