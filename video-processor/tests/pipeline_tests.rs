//! End-to-end pipeline tests against local doubles

mod common;

use common::{payload, Faults, Harness, PROCESSED_BUCKET, THUMBNAIL_BUCKET};
use vidproc_types::{JobState, VideoRecord, VideoRecordPatch, VideoStatus};

const NAME: &str = "u1-1700000000000.mp4";
const VIDEO_ID: &str = "u1-1700000000000";

#[tokio::test]
async fn test_happy_path_publishes_and_marks_processed() {
    let harness = Harness::new().await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(response.message, "Processing finished successfully");

    let record = harness.record(VIDEO_ID).await.unwrap();
    assert_eq!(record.uid, "u1");
    assert_eq!(record.status, Some(VideoStatus::Processed));
    assert_eq!(record.filename.as_deref(), Some("processed-u1-1700000000000.mp4"));
    assert_eq!(
        record.thumbnail_url.as_deref(),
        Some("https://storage.googleapis.com/fc-yt-thumbnails/u1-1700000000000.jpg")
    );
    assert!(record.created_at.is_some());
    assert!(record.updated_at.is_some());

    let blobs = &harness.blobs.inner;
    assert!(blobs.is_public(PROCESSED_BUCKET, "processed-u1-1700000000000.mp4"));
    assert!(blobs.is_public(THUMBNAIL_BUCKET, "u1-1700000000000.jpg"));

    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_already_claimed_video_is_rejected_without_side_effects() {
    for status in [VideoStatus::Processing, VideoStatus::Processed] {
        let harness = Harness::new().await;
        harness.seed_raw(NAME).await;
        let existing = VideoRecordPatch {
            uid: Some("u1".to_string()),
            status: Some(status),
            ..Default::default()
        }
        .into_record(VIDEO_ID);
        harness.statuses.inner.insert(existing.clone()).await;

        let response = harness.pipeline.process_video(&payload(NAME)).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.message, "Bad Request: video already processing or processed");

        assert_eq!(harness.blobs.downloads(), 0);
        assert_eq!(harness.codec.calls(), 0);
        assert_eq!(harness.record(VIDEO_ID).await, Some(existing));
        assert!(harness.staged_files().is_empty());
    }
}

#[tokio::test]
async fn test_second_request_after_success_conflicts() {
    let harness = Harness::new().await;
    harness.seed_raw(NAME).await;

    assert!(harness.pipeline.process_video(&payload(NAME)).await.is_success());
    let again = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(again.status_code, 400);
    assert_eq!(harness.blobs.downloads(), 1);
}

#[tokio::test]
async fn test_concurrent_duplicates_process_once() {
    let harness = Harness::new().await;
    harness.seed_raw(NAME).await;

    let body = payload(NAME);
    let (first, second) = futures::future::join(
        harness.pipeline.process_video(&body),
        harness.pipeline.process_video(&body),
    )
    .await;

    let codes = [first.status_code, second.status_code];
    assert_eq!(codes.iter().filter(|&&c| c == 200).count(), 1);
    assert_eq!(codes.iter().filter(|&&c| c == 400).count(), 1);
    assert_eq!(harness.blobs.downloads(), 1);
}

#[tokio::test]
async fn test_missing_raw_video_is_not_found() {
    let harness = Harness::new().await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 404);
    assert_eq!(
        response.message,
        "Error: Raw video u1-1700000000000.mp4 not found in bucket."
    );

    let record = harness.record(VIDEO_ID).await.unwrap();
    assert_eq!(record.state(), JobState::Processing);
    assert_eq!(harness.codec.calls(), 0);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_interrupted_download_removes_partial_file() {
    let harness = Harness::with_faults(Faults {
        fail_downloads: true,
        ..Default::default()
    })
    .await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 500);
    assert!(
        response.message.starts_with("Error downloading raw video: "),
        "{}",
        response.message
    );
    assert!(response.message.contains("connection reset"));

    assert_eq!(harness.record(VIDEO_ID).await.unwrap().state(), JobState::Processing);
    assert_eq!(harness.blobs.downloads(), 1);
    assert_eq!(harness.codec.calls(), 0);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_transcode_failure_cleans_up_and_stays_processing() {
    let harness = Harness::with_faults(Faults {
        fail_transcode: true,
        ..Default::default()
    })
    .await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(response.message, "Processing failed");

    assert_eq!(harness.record(VIDEO_ID).await.unwrap().state(), JobState::Processing);
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_thumbnail_failure_cleans_up_everything() {
    let harness = Harness::with_faults(Faults {
        fail_thumbnail: true,
        ..Default::default()
    })
    .await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(response.message, "Thumbnail generation failed");

    assert_eq!(harness.record(VIDEO_ID).await.unwrap().state(), JobState::Processing);
    assert!(harness.staged_files().is_empty());
    assert!(!harness.blobs.inner.exists(PROCESSED_BUCKET, "processed-u1-1700000000000.mp4"));
}

#[tokio::test]
async fn test_publish_failure_cleans_up_local_files() {
    let harness = Harness::with_faults(Faults {
        fail_uploads_to: Some(THUMBNAIL_BUCKET),
        ..Default::default()
    })
    .await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(response.message, "Upload failed");

    let record = harness.record(VIDEO_ID).await.unwrap();
    assert_eq!(record.state(), JobState::Processing);
    assert!(record.thumbnail_url.is_none());
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_finalize_failure_still_cleans_up() {
    let harness = Harness::with_faults(Faults {
        fail_upserts: true,
        ..Default::default()
    })
    .await;
    harness.seed_raw(NAME).await;

    let response = harness.pipeline.process_video(&payload(NAME)).await;
    assert_eq!(response.status_code, 500);
    assert!(response.message.starts_with("Internal error: "));
    assert!(harness.staged_files().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_rejected_before_store_access() {
    let harness = Harness::new().await;

    let bodies: [&[u8]; 4] = [b"not json", b"{}", br#"{"name":""}"#, br#"{"name":null}"#];
    for body in bodies {
        let response = harness.pipeline.process_video(body).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.message, "Bad Request: missing filename.");
    }

    assert_eq!(harness.statuses.calls(), 0);
    assert_eq!(harness.blobs.downloads(), 0);
}

#[tokio::test]
async fn test_path_like_and_extensionless_names_rejected() {
    let harness = Harness::new().await;

    for name in ["../etc/passwd", "nested/u1-1.mp4", ".mp4", "u1-1700000000000"] {
        let response = harness.pipeline.process_video(&payload(name)).await;
        assert_eq!(response.status_code, 400);
        assert!(response.message.starts_with("Bad Request: invalid filename"));
    }

    assert_eq!(harness.statuses.calls(), 0);
}

#[tokio::test]
async fn test_name_without_owner_separator_is_processed() {
    let harness = Harness::new().await;
    harness.seed_raw("clip.mp4").await;

    let response = harness.pipeline.process_video(&payload("clip.mp4")).await;
    assert!(response.is_success());

    let record: VideoRecord = harness.record("clip").await.unwrap();
    assert_eq!(record.uid, "clip");
    assert_eq!(record.filename.as_deref(), Some("processed-clip.mp4"));
}
