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

//! Integration tests for the processor facade: routing, load fallback and
//! batch cancellation

use mediaprep_media::mock::{LoadBehavior, MockVideoHost};
use mediaprep_media::{
    CompressionConfig, ErrorKind, MediaBlob, MediaProcessor, PipelineTimeouts, Stage,
};
use mediaprep_test_utils::TestFixtures;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const MB: u64 = 1024 * 1024;

fn video(bytes: u64, mime: &str) -> MediaBlob {
    MediaBlob::new(TestFixtures::video_bytes(bytes as usize), mime)
}

#[tokio::test(start_paused = true)]
async fn test_load_timeout_falls_back_to_conversion() {
    let host = Arc::new(MockVideoHost::new().with_load_behavior(LoadBehavior::HangOnce));
    let processor = MediaProcessor::new(host.clone());
    let config = CompressionConfig::video_defaults().with_max_size_mb(10.0);

    let outcome = processor
        .prepare_video(video(20 * MB, "video/quicktime"), &config, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.blob.mime_type().starts_with("video/mp4"));
    assert_eq!(host.loads_attempted(), 2);
    assert_eq!(host.urls_created(), 2);
    assert_eq!(host.urls_revoked(), 2);
    assert_eq!(host.recorders_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refused_source_is_handed_to_converter() {
    let host = Arc::new(MockVideoHost::new().refusing_source_type("video/quicktime"));
    let processor = MediaProcessor::new(host.clone());
    let config = CompressionConfig::video_defaults().with_max_size_mb(10.0);

    let err = processor
        .prepare_video(video(20 * MB, "video/quicktime"), &config, &CancellationToken::new())
        .await
        .unwrap_err();

    // Compressor and converter each tried to load the source once
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(err.stage(), Some(Stage::LoadingSource));
    assert_eq!(host.loads_attempted(), 2);
    assert_eq!(host.urls_revoked(), 2);
    assert_eq!(host.recorders_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recorder_refusal_after_load_does_not_fall_back() {
    let host = Arc::new(MockVideoHost::new().rejecting_recorders());
    let processor = MediaProcessor::new(host.clone());
    let config = CompressionConfig::video_defaults().with_max_size_mb(10.0);

    let err = processor
        .prepare_video(video(20 * MB, "video/quicktime"), &config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_ne!(err.stage(), Some(Stage::LoadingSource));
    assert_eq!(host.loads_attempted(), 1);
    assert_eq!(host.urls_created(), 1);
    assert_eq!(host.urls_revoked(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_load_timeout_is_honoured() {
    let host = Arc::new(MockVideoHost::new().with_load_behavior(LoadBehavior::Hang));
    let processor = MediaProcessor::new(host.clone())
        .with_timeouts(PipelineTimeouts {
            load: Duration::from_secs(5),
        })
        .unwrap();

    let started = Instant::now();
    let err = processor
        .compress_video(
            video(60 * MB, "video/mp4"),
            &CompressionConfig::video_defaults(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadTimeout);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_missing_codecs_do_not_fall_back() {
    let host = Arc::new(MockVideoHost::new().supporting_nothing());
    let processor = MediaProcessor::new(host.clone());

    let err = processor
        .prepare_video(
            video(60 * MB, "video/mp4"),
            &CompressionConfig::video_defaults(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(host.urls_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_routes_by_kind() {
    let host = Arc::new(MockVideoHost::new());
    let processor = MediaProcessor::new(host.clone());
    let photo = TestFixtures::gradient_jpeg(64, 48);

    let results = processor
        .process_batch(
            vec![
                MediaBlob::new(photo.clone(), "image/jpeg"),
                video(MB, "video/mp4"),
                MediaBlob::new(vec![0x25, 0x50, 0x44, 0x46], "application/pdf"),
            ],
            &CompressionConfig::image_defaults(),
            &CompressionConfig::video_defaults(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(results.len(), 3);
    let image = results[0].as_ref().unwrap();
    assert_eq!(image.blob.as_bytes(), photo.as_slice());
    assert!(!results[1].as_ref().unwrap().was_reencoded());
    assert_eq!(
        results[2].as_ref().unwrap_err().kind(),
        ErrorKind::UnsupportedFormat
    );
    assert_eq!(host.urls_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_batch_touches_nothing() {
    let host = Arc::new(MockVideoHost::new());
    let processor = MediaProcessor::new(host.clone());
    let token = CancellationToken::new();
    token.cancel();

    let results = processor
        .process_batch(
            vec![video(60 * MB, "video/mp4"), video(70 * MB, "video/webm")],
            &CompressionConfig::image_defaults(),
            &CompressionConfig::video_defaults(),
            &token,
        )
        .await;

    assert!(results
        .iter()
        .all(|r| r.as_ref().is_err_and(|e| e.is_cancelled())));
    assert_eq!(host.urls_created(), 0);
    assert_eq!(host.loads_attempted(), 0);
}
