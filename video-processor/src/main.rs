//! Video Processor
//!
//! Receives upload notifications over HTTP (Pub/Sub push) and processes each
//! uploaded video:
//! - Transcodes it to a fixed height
//! - Extracts a thumbnail
//! - Publishes both to object storage
//! - Records the result in the status store
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use vidproc_config::AppConfig;
use vidproc_logging::{init_logging, LogFormat};
use video_processor::server::{self, HttpServer};
use video_processor::{
    BlobStore, FfmpegCodec, FirestoreStatusStore, LocalBlobStore, MemoryStatusStore,
    ObjectStorage, PipelineSettings, StagingArea, StatusStore, VideoPipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    init_logging(
        "video-processor",
        config.log_level(),
        LogFormat::parse(config.log_format()),
    );

    info!("Starting Video Processor");

    let staging = StagingArea::new(&config.staging);
    staging
        .ensure_directories()
        .await
        .context("Failed to create staging directories")?;

    let blobs: Arc<dyn BlobStore> = match &config.object_storage {
        Some(storage_config) => Arc::new(
            ObjectStorage::new(storage_config).context("Failed to create object storage client")?,
        ),
        None => {
            warn!(
                root = %config.local_blob_root.display(),
                "Object storage keys not configured, using local blob store"
            );
            Arc::new(LocalBlobStore::new(&config.local_blob_root))
        }
    };

    let statuses: Arc<dyn StatusStore> = match &config.firestore {
        Some(firestore_config) => Arc::new(
            FirestoreStatusStore::new(firestore_config)
                .context("Failed to create Firestore client")?,
        ),
        None => {
            warn!("GOOGLE_CLOUD_PROJECT not set, using in-memory status store");
            Arc::new(MemoryStatusStore::new())
        }
    };

    let codec = FfmpegCodec::new(config.codec.ffmpeg_path.clone());
    if !codec.is_available().await {
        warn!(
            ffmpeg_path = config.codec.ffmpeg_path,
            "FFmpeg not available, every transcode will fail"
        );
    }

    info!(
        port = config.port,
        raw_bucket = config.buckets.raw,
        processed_bucket = config.buckets.processed,
        thumbnail_bucket = config.buckets.thumbnails,
        blob_store = blobs.backend_name(),
        status_store = statuses.backend_name(),
        "Configuration loaded"
    );

    let pipeline = Arc::new(VideoPipeline::new(
        blobs,
        statuses,
        Arc::new(codec),
        staging,
        PipelineSettings::from_config(&config),
    ));

    HttpServer::new(config.port)
        .start(server::router(pipeline))
        .await?;

    info!("Video Processor stopped");
    Ok(())
}
