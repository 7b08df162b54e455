//! Shared test doubles for pipeline and server tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vidproc_config::StagingConfig;
use vidproc_types::{VideoRecord, VideoRecordPatch};
use video_processor::{
    BlobStore, BlobStoreError, CodecError, LocalBlobStore, MediaCodec, MemoryStatusStore,
    PipelineSettings, StagingArea, StatusStore, StatusStoreError, VideoPipeline,
};

pub const RAW_BUCKET: &str = "fc-yt-raw-videos";
pub const PROCESSED_BUCKET: &str = "fc-yt-processed-videos";
pub const THUMBNAIL_BUCKET: &str = "fc-yt-thumbnails";

pub fn payload(name: &str) -> Vec<u8> {
    serde_json::json!({ "name": name, "bucket": RAW_BUCKET })
        .to_string()
        .into_bytes()
}

/// Codec that writes placeholder files, or fails on request after leaving
/// a partial output behind
#[derive(Default)]
pub struct ScriptedCodec {
    pub fail_transcode: bool,
    pub fail_thumbnail: bool,
    pub calls: AtomicUsize,
}

impl ScriptedCodec {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn scripted_failure(operation: &'static str) -> CodecError {
    CodecError::Failed {
        operation,
        status: "exit code 1".to_string(),
        stderr: "Invalid data found when processing input".to_string(),
    }
}

#[async_trait]
impl MediaCodec for ScriptedCodec {
    async fn transcode(&self, source: &Path, destination: &Path, height: u32) -> Result<(), CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(source.is_file(), "transcode source must be staged");
        tokio::fs::write(destination, format!("scaled to {}", height))
            .await
            .map_err(|source| CodecError::Spawn {
                program: "scripted".to_string(),
                source,
            })?;
        if self.fail_transcode {
            return Err(scripted_failure("transcode"));
        }
        Ok(())
    }

    async fn extract_frame(
        &self,
        _source: &Path,
        dest_dir: &Path,
        dest_name: &str,
        timestamp_secs: u32,
    ) -> Result<(), CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest_dir.join(dest_name), format!("frame at {}", timestamp_secs))
            .await
            .map_err(|source| CodecError::Spawn {
                program: "scripted".to_string(),
                source,
            })?;
        if self.fail_thumbnail {
            return Err(scripted_failure("thumbnail"));
        }
        Ok(())
    }
}

/// `LocalBlobStore` wrapper that counts downloads, can break downloads
/// halfway, and can refuse uploads to one bucket
pub struct FlakyBlobStore {
    pub inner: LocalBlobStore,
    pub fail_downloads: bool,
    pub fail_uploads_to: Option<String>,
    pub downloads: AtomicUsize,
}

impl FlakyBlobStore {
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, BlobStoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads {
            tokio::fs::write(destination, b"partial").await?;
            return Err(BlobStoreError::Request(format!(
                "connection reset while reading {}/{}",
                bucket, key
            )));
        }
        self.inner.download(bucket, key, destination).await
    }

    async fn upload(&self, bucket: &str, source: &Path, key: &str) -> Result<(), BlobStoreError> {
        if self.fail_uploads_to.as_deref() == Some(bucket) {
            return Err(BlobStoreError::Request(format!("403 Forbidden for {}/{}", bucket, key)));
        }
        self.inner.upload(bucket, source, key).await
    }

    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        self.inner.make_public(bucket, key).await
    }

    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }
}

/// `MemoryStatusStore` wrapper that counts calls and can fail upserts
#[derive(Default)]
pub struct CountingStatusStore {
    pub inner: MemoryStatusStore,
    pub fail_upserts: bool,
    pub calls: AtomicUsize,
}

impl CountingStatusStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for CountingStatusStore {
    async fn get(&self, id: &str) -> Result<Option<VideoRecord>, StatusStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn upsert(&self, id: &str, patch: &VideoRecordPatch) -> Result<(), StatusStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts {
            return Err(StatusStoreError::Request("deadline exceeded".to_string()));
        }
        self.inner.upsert(id, patch).await
    }

    async fn claim(&self, record: &VideoRecord) -> Result<bool, StatusStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.claim(record).await
    }

    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }
}

/// Options for building a [`Harness`]
#[derive(Default)]
pub struct Faults {
    pub fail_downloads: bool,
    pub fail_transcode: bool,
    pub fail_thumbnail: bool,
    pub fail_uploads_to: Option<&'static str>,
    pub fail_upserts: bool,
}

/// A pipeline over temp directories with inspectable collaborators
pub struct Harness {
    pub root: TempDir,
    pub blobs: Arc<FlakyBlobStore>,
    pub statuses: Arc<CountingStatusStore>,
    pub codec: Arc<ScriptedCodec>,
    pub pipeline: Arc<VideoPipeline>,
    staging_dirs: [PathBuf; 3],
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_faults(Faults::default()).await
    }

    pub async fn with_faults(faults: Faults) -> Self {
        let root = TempDir::new().unwrap();
        let staging_config = StagingConfig {
            raw_dir: root.path().join("raw-videos"),
            processed_dir: root.path().join("processed-videos"),
            thumbnail_dir: root.path().join("thumbnails"),
        };
        let staging = StagingArea::new(&staging_config);
        staging.ensure_directories().await.unwrap();

        let blobs = Arc::new(FlakyBlobStore {
            inner: LocalBlobStore::new(root.path().join("buckets")),
            fail_downloads: faults.fail_downloads,
            fail_uploads_to: faults.fail_uploads_to.map(str::to_string),
            downloads: AtomicUsize::new(0),
        });
        let statuses = Arc::new(CountingStatusStore {
            fail_upserts: faults.fail_upserts,
            ..Default::default()
        });
        let codec = Arc::new(ScriptedCodec {
            fail_transcode: faults.fail_transcode,
            fail_thumbnail: faults.fail_thumbnail,
            ..Default::default()
        });

        let settings = PipelineSettings {
            raw_bucket: RAW_BUCKET.to_string(),
            processed_bucket: PROCESSED_BUCKET.to_string(),
            thumbnail_bucket: THUMBNAIL_BUCKET.to_string(),
            public_host: "storage.googleapis.com".to_string(),
            target_height: 360,
            thumbnail_offset_secs: 5,
        };

        let pipeline = Arc::new(VideoPipeline::new(
            blobs.clone(),
            statuses.clone(),
            codec.clone(),
            staging,
            settings,
        ));

        Self {
            root,
            blobs,
            statuses,
            codec,
            pipeline,
            staging_dirs: [
                staging_config.raw_dir,
                staging_config.processed_dir,
                staging_config.thumbnail_dir,
            ],
        }
    }

    /// Place a raw upload in the raw bucket
    pub async fn seed_raw(&self, name: &str) {
        self.blobs
            .inner
            .put_bytes(RAW_BUCKET, name, b"raw video bytes")
            .await
            .unwrap();
    }

    pub async fn record(&self, id: &str) -> Option<VideoRecord> {
        self.statuses.inner.get(id).await.unwrap()
    }

    /// Every file left in the staging directories
    pub fn staged_files(&self) -> Vec<PathBuf> {
        self.staging_dirs
            .iter()
            .flat_map(|dir| std::fs::read_dir(dir).unwrap())
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}
