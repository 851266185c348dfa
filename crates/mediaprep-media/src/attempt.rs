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

//! Attempt records, the per-attempt state machine, and cancellable suspension

use crate::blob::MediaBlob;
use crate::error::{MediaError, Result, Stage};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Retry depth cap: one backoff attempt after the initial one
pub const MAX_RETRY_DEPTH: u8 = 1;

/// Video attempt lifecycle.
///
/// `Idle → LoadingSource → Ready → Recording → Stopped → Finalized`, with
/// `LoadFailed` and `RecordFailed` as terminal error states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttemptState {
    /// Created, nothing opened
    Idle,
    /// Metadata load in flight
    LoadingSource,
    /// Metadata load failed or timed out
    LoadFailed,
    /// Source open, encoder negotiated
    Ready,
    /// Frame pump running
    Recording,
    /// Pump or recorder failed
    RecordFailed,
    /// Pump finished, recorder flushing
    Stopped,
    /// Output blob available
    Finalized,
}

impl AttemptState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Idle, LoadingSource)
                | (LoadingSource, LoadFailed)
                | (LoadingSource, Ready)
                | (Ready, Recording)
                | (Ready, RecordFailed)
                | (Recording, RecordFailed)
                | (Recording, Stopped)
                | (Stopped, RecordFailed)
                | (Stopped, Finalized)
        )
    }

    /// Whether the attempt can make no further progress
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::LoadFailed | AttemptState::RecordFailed | AttemptState::Finalized
        )
    }
}

/// Encode parameter an attempt ran with
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EncodeSetting {
    /// Lossy still-image quality in (0, 1]
    Quality(f32),
    /// Video bitrate in bits per second
    Bitrate(u64),
}

/// One pass through a compressor at fixed parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingAttempt {
    /// Position in the video backoff chain, 0 for the initial attempt.
    /// Image attempts never retry and always carry 0 here.
    pub retry_depth: u8,
    /// Position on the image quality ladder, 0 for the first encode.
    /// Always 0 for video.
    pub ladder_step: u8,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Quality or bitrate used
    pub setting: EncodeSetting,
    /// Encoded size, once known
    pub output_bytes: Option<u64>,
    /// Lifecycle state (images go straight from `Idle` to `Finalized`)
    pub state: AttemptState,
}

impl ProcessingAttempt {
    /// Start a new attempt record
    pub fn new(retry_depth: u8, width: u32, height: u32, setting: EncodeSetting) -> Self {
        ProcessingAttempt {
            retry_depth,
            ladder_step: 0,
            width,
            height,
            setting,
            output_bytes: None,
            state: AttemptState::Idle,
        }
    }

    /// Record of one finished encode on the image quality ladder
    pub fn ladder(step: u8, width: u32, height: u32, quality: f32, output_bytes: u64) -> Self {
        ProcessingAttempt {
            ladder_step: step,
            output_bytes: Some(output_bytes),
            state: AttemptState::Finalized,
            ..ProcessingAttempt::new(0, width, height, EncodeSetting::Quality(quality))
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: AttemptState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(MediaError::encode_failure(
                Stage::Recording,
                format!("illegal attempt transition {:?} -> {:?}", self.state, next),
            ));
        }
        trace!(from = ?self.state, to = ?next, depth = self.retry_depth, "attempt transition");
        self.state = next;
        Ok(())
    }

    /// Whether a backoff retry may follow this attempt
    pub fn may_retry(&self) -> bool {
        self.retry_depth < MAX_RETRY_DEPTH
    }
}

/// Result of a compression call with the attempt chain that produced it
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Final blob handed back to the caller
    pub blob: MediaBlob,
    /// Attempts in execution order; empty when the size gate passed the input
    pub attempts: Vec<ProcessingAttempt>,
    /// Whether the output fits the byte budget
    pub budget_met: bool,
}

impl CompressionOutcome {
    /// Input returned untouched by the size gate
    pub fn passthrough(blob: MediaBlob) -> Self {
        CompressionOutcome {
            blob,
            attempts: Vec::new(),
            budget_met: true,
        }
    }

    /// Whether any re-encode happened
    pub fn was_reencoded(&self) -> bool {
        !self.attempts.is_empty()
    }

    /// Best-effort result over budget (`SizeBudgetUnreachable`)
    pub fn budget_unreachable(&self) -> bool {
        !self.budget_met
    }
}

/// Await `fut` as a cancellable, optionally time-bounded suspension point.
///
/// Cancellation wins over a result that completes in the same poll, and a
/// result that arrives after the token fired is discarded: once a call has
/// settled as `Cancelled` nothing else is committed.
pub async fn suspend<F, T>(
    token: &CancellationToken,
    stage: Stage,
    bound: Option<Duration>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(MediaError::Cancelled);
    }

    let bounded = async {
        match bound {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| MediaError::LoadTimeout { stage, after })?,
            None => fut.await,
        }
    };

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(MediaError::Cancelled),
        result = bounded => result,
    };

    if token.is_cancelled() {
        return Err(MediaError::Cancelled);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut attempt = ProcessingAttempt::new(0, 640, 360, EncodeSetting::Bitrate(500_000));
        for next in [
            AttemptState::LoadingSource,
            AttemptState::Ready,
            AttemptState::Recording,
            AttemptState::Stopped,
            AttemptState::Finalized,
        ] {
            attempt.advance(next).unwrap();
        }
        assert!(attempt.state.is_terminal());
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut attempt = ProcessingAttempt::new(0, 1, 1, EncodeSetting::Quality(0.8));
        assert!(attempt.advance(AttemptState::Recording).is_err());
        assert_eq!(attempt.state, AttemptState::Idle);
        assert!(!AttemptState::Finalized.can_transition_to(AttemptState::Recording));
        assert!(AttemptState::LoadingSource.can_transition_to(AttemptState::LoadFailed));
    }

    #[test]
    fn retry_depth_is_capped() {
        assert!(ProcessingAttempt::new(0, 1, 1, EncodeSetting::Bitrate(1)).may_retry());
        assert!(!ProcessingAttempt::new(1, 1, 1, EncodeSetting::Bitrate(1)).may_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_times_out() {
        let token = CancellationToken::new();
        let err = suspend(
            &token,
            Stage::LoadingSource,
            Some(Duration::from_secs(20)),
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();
        assert!(err.is_load_timeout());
    }

    #[tokio::test]
    async fn suspend_short_circuits_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let err = suspend(&token, Stage::Encoding, None, async { Ok(7) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_suspension() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });
        let err = suspend(
            &token,
            Stage::Recording,
            None,
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
