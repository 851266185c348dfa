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

//! Single recording attempt shared by the compressor and the converter
//!
//! One call to [`run_attempt`] walks one [`ProcessingAttempt`] through
//! `LoadingSource → Ready → Recording → Stopped → Finalized`. Every
//! transient handle it opens (the object URL, the duration-cap timer and
//! the frame pump) is registered on a per-attempt [`ResourceTracker`], so
//! all of them are released on success, error, timeout and cancellation.

use crate::attempt::{suspend, AttemptState, EncodeSetting, ProcessingAttempt};
use crate::blob::MediaBlob;
use crate::codec::{CodecChoice, CodecNegotiator};
use crate::error::{MediaError, Result, Stage};
use crate::host::{FrameRecorder, FrameSource, RecorderSettings, VideoHost};
use crate::policy::EncodePlan;
use crate::raster::{even_dimensions, fit_within, scale_by, RasterSurface};
use crate::resources::{ResourceKind, ResourceTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why the frame pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// Source playback reached its end
    EndOfSource,
    /// Recording cap elapsed first
    DurationCap,
}

/// Parameters for one attempt
#[derive(Debug, Clone)]
pub(crate) struct AttemptRequest<'a> {
    pub retry_depth: u8,
    pub plan: EncodePlan,
    pub max_width: u32,
    pub max_height: u32,
    pub max_duration: Duration,
    pub load_timeout: Duration,
    pub chain: &'a CodecChoice,
}

/// A finalized attempt and what it produced
#[derive(Debug)]
pub(crate) struct RecordedAttempt {
    pub attempt: ProcessingAttempt,
    pub blob: MediaBlob,
    pub frames: u64,
    pub stop: StopReason,
}

struct PumpReport {
    recorder: Box<dyn FrameRecorder>,
    frames: u64,
    stop: StopReason,
}

/// Run one attempt against `host`. Resources are released before returning.
pub(crate) async fn run_attempt(
    host: &Arc<dyn VideoHost>,
    source: &MediaBlob,
    request: AttemptRequest<'_>,
    token: &CancellationToken,
) -> Result<RecordedAttempt> {
    let tracker = ResourceTracker::with_parent(token);
    let mut attempt = ProcessingAttempt::new(
        request.retry_depth,
        0,
        0,
        EncodeSetting::Bitrate(request.plan.bitrate_bps),
    );

    let result = record(host, source, &request, &tracker, &mut attempt).await;
    let released = tracker.release_all();

    match result {
        Ok((blob, frames, stop)) => {
            attempt.output_bytes = Some(blob.len());
            attempt.advance(AttemptState::Finalized)?;
            debug!(
                depth = attempt.retry_depth,
                output_bytes = blob.len(),
                frames,
                ?stop,
                released,
                "attempt finalized"
            );
            Ok(RecordedAttempt {
                attempt,
                blob,
                frames,
                stop,
            })
        }
        Err(e) => {
            let failed = match attempt.state {
                AttemptState::LoadingSource => Some(AttemptState::LoadFailed),
                AttemptState::Ready | AttemptState::Recording | AttemptState::Stopped => {
                    Some(AttemptState::RecordFailed)
                }
                _ => None,
            };
            if let Some(next) = failed {
                attempt.advance(next)?;
            }
            if !e.is_cancelled() {
                warn!(
                    depth = attempt.retry_depth,
                    state = ?attempt.state,
                    released,
                    error = %e,
                    "attempt failed"
                );
            }
            Err(e)
        }
    }
}

async fn record(
    host: &Arc<dyn VideoHost>,
    source: &MediaBlob,
    request: &AttemptRequest<'_>,
    tracker: &ResourceTracker,
    attempt: &mut ProcessingAttempt,
) -> Result<(MediaBlob, u64, StopReason)> {
    let active = tracker.active_token();

    let url = host.create_object_url(source);
    {
        let host = Arc::clone(host);
        let url = url.clone();
        tracker.register(ResourceKind::ObjectUrl, move || host.revoke_object_url(&url));
    }

    attempt.advance(AttemptState::LoadingSource)?;
    let metadata = suspend(
        &active,
        Stage::LoadingSource,
        Some(request.load_timeout),
        host.load_metadata(&url),
    )
    .await
    .map_err(|e| e.in_stage(Stage::LoadingSource))?;
    if metadata.width == 0 || metadata.height == 0 {
        return Err(MediaError::unsupported_at(
            Stage::LoadingSource,
            "source has no video dimensions",
        ));
    }

    let target = CodecNegotiator::new(&**host).negotiate(request.chain)?;

    let (scaled_w, scaled_h) = scale_by(metadata.width, metadata.height, request.plan.scale);
    let (fit_w, fit_h) = fit_within(scaled_w, scaled_h, request.max_width, request.max_height);
    let (width, height) = even_dimensions(fit_w, fit_h);
    attempt.width = width;
    attempt.height = height;
    attempt.advance(AttemptState::Ready)?;
    debug!(
        depth = attempt.retry_depth,
        source_w = metadata.width,
        source_h = metadata.height,
        width,
        height,
        bitrate = request.plan.bitrate_bps,
        %target,
        "attempt ready"
    );

    let surface = RasterSurface::allocate(width, height)?;
    let settings = RecorderSettings {
        width,
        height,
        bitrate_bps: request.plan.bitrate_bps,
    };
    let mut recorder = host.create_recorder(&target, &settings)?;
    let mut frames = suspend(
        &active,
        Stage::LoadingSource,
        Some(request.load_timeout),
        host.open_source(&url),
    )
    .await
    .map_err(|e| e.in_stage(Stage::LoadingSource))?;

    match frames.take_audio_track() {
        Some(track) => {
            debug!(track = %track.id, "carrying audio track");
            recorder.attach_audio(track);
        }
        None => debug!("source has no audio track"),
    }

    attempt.advance(AttemptState::Recording)?;

    let cap = CancellationToken::new();
    let timer = {
        let cap = cap.clone();
        let max_duration = request.max_duration;
        tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;
            cap.cancel();
        })
    };
    tracker.register_task(ResourceKind::Timer, timer.abort_handle());

    let pump = tokio::spawn(frame_pump(frames, recorder, surface, active.clone(), cap));
    tracker.register_task(ResourceKind::FramePump, pump.abort_handle());

    let report = suspend(&active, Stage::Recording, None, async move {
        pump.await.map_err(|e| {
            if e.is_cancelled() {
                MediaError::Cancelled
            } else {
                MediaError::encode_failure(Stage::Recording, format!("frame pump failed: {}", e))
            }
        })?
    })
    .await?;

    attempt.advance(AttemptState::Stopped)?;
    debug!(frames = report.frames, stop = ?report.stop, "recording stopped");

    let blob = suspend(&active, Stage::Finalizing, None, report.recorder.stop()).await?;
    Ok((blob, report.frames, report.stop))
}

/// Paint each decoded frame onto the surface and hand it to the recorder
/// until the source ends, the cap fires, or the attempt is released.
async fn frame_pump(
    mut source: Box<dyn FrameSource>,
    mut recorder: Box<dyn FrameRecorder>,
    mut surface: RasterSurface,
    active: CancellationToken,
    cap: CancellationToken,
) -> Result<PumpReport> {
    let mut frames = 0u64;
    let stop = loop {
        let next = tokio::select! {
            biased;
            _ = active.cancelled() => return Err(MediaError::Cancelled),
            _ = cap.cancelled() => break StopReason::DurationCap,
            next = source.next_frame() => next?,
        };
        let Some(frame) = next else {
            break StopReason::EndOfSource;
        };
        if active.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        surface.paint(&frame.image);
        recorder.write_frame(frame.timestamp, surface.pixels()).await?;
        frames += 1;
    };

    Ok(PumpReport {
        recorder,
        frames,
        stop,
    })
}
