//! Video Pipeline - drives one upload from trigger to published artifacts
//!
//! Stages run in order: admit (idempotency claim), download, transcode,
//! thumbnail, publish, finalize. Every failure after download removes the
//! files this job staged before the response is returned. The status record
//! is left at `processing` on failure and needs operator attention.
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


use crate::codec::MediaCodec;
use crate::staging::{StagedArtifacts, StagingArea};
use crate::status::StatusStore;
use crate::storage::{public_url, BlobStore, BlobStoreError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};
use vidproc_config::AppConfig;
use vidproc_types::{
    JobState, ProcessError, ProcessResponse, TriggerPayload, VideoJob, VideoRecord,
    VideoRecordPatch,
};

/// Buckets and codec parameters used by the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub raw_bucket: String,
    pub processed_bucket: String,
    pub thumbnail_bucket: String,
    pub public_host: String,
    pub target_height: u32,
    pub thumbnail_offset_secs: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            raw_bucket: config.buckets.raw.clone(),
            processed_bucket: config.buckets.processed.clone(),
            thumbnail_bucket: config.buckets.thumbnails.clone(),
            public_host: config.public_storage_host.clone(),
            target_height: config.codec.target_height,
            thumbnail_offset_secs: config.codec.thumbnail_offset_secs,
        }
    }

    /// Public URL stored on the record for a thumbnail
    pub fn thumbnail_url(&self, thumbnail_name: &str) -> String {
        public_url(&self.public_host, &self.thumbnail_bucket, thumbnail_name)
    }
}

/// Processing pipeline with its collaborators injected
pub struct VideoPipeline {
    blobs: Arc<dyn BlobStore>,
    statuses: Arc<dyn StatusStore>,
    codec: Arc<dyn MediaCodec>,
    staging: StagingArea,
    settings: PipelineSettings,
}

impl VideoPipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        statuses: Arc<dyn StatusStore>,
        codec: Arc<dyn MediaCodec>,
        staging: StagingArea,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            blobs,
            statuses,
            codec,
            staging,
            settings,
        }
    }

    pub fn blob_backend(&self) -> &str {
        self.blobs.backend_name()
    }

    pub fn status_backend(&self) -> &str {
        self.statuses.backend_name()
    }

    /// Process the object named by a raw trigger payload and produce the
    /// terminal response. Never panics on bad input; every outcome is a
    /// status code and message.
    pub async fn process_video(&self, payload: &[u8]) -> ProcessResponse {
        let job = match Self::parse_job(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, detail = e.detail(), "Rejected trigger payload");
                return ProcessResponse::from(&e);
            }
        };

        let span = tracing::info_span!(
            "process_video",
            video_id = %job.video_id,
            object_name = %job.object_name
        );

        async {
            let started = Instant::now();
            match self.run(&job).await {
                Ok(()) => {
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Processing finished"
                    );
                    ProcessResponse::success()
                }
                Err(e) => {
                    if e.status_code() >= 500 {
                        error!(error = %e, detail = e.detail(), "Processing failed");
                    } else {
                        warn!(error = %e, detail = e.detail(), "Processing rejected");
                    }
                    ProcessResponse::from(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn parse_job(payload: &[u8]) -> Result<VideoJob, ProcessError> {
        let trigger = TriggerPayload::from_slice(payload)?;
        VideoJob::from_object_name(trigger.object_name()?)
    }

    async fn run(&self, job: &VideoJob) -> Result<(), ProcessError> {
        self.admit(job).await?;

        let artifacts = self.staging.artifacts(job);

        if let Err(e) = self.download(job, &artifacts).await {
            StagingArea::discard(&[artifacts.raw.as_path()]).await;
            return Err(e);
        }

        if let Err(e) = self
            .codec
            .transcode(&artifacts.raw, &artifacts.processed, self.settings.target_height)
            .await
        {
            StagingArea::discard(&[artifacts.raw.as_path(), artifacts.processed.as_path()]).await;
            return Err(ProcessError::TranscodeFailure(e.to_string()));
        }

        if let Err(e) = self
            .codec
            .extract_frame(
                &artifacts.raw,
                self.staging.thumbnail_dir(),
                &job.thumbnail_name,
                self.settings.thumbnail_offset_secs,
            )
            .await
        {
            StagingArea::discard(&artifacts.all()).await;
            return Err(ProcessError::ThumbnailFailure(e.to_string()));
        }

        // Remote objects that did upload are left in place
        if let Err(e) = self.publish(job, &artifacts).await {
            StagingArea::discard(&artifacts.all()).await;
            return Err(e);
        }

        let finalize = self
            .statuses
            .upsert(
                &job.video_id,
                &VideoRecordPatch::processed(
                    job.output_name.as_str(),
                    self.settings.thumbnail_url(&job.thumbnail_name),
                ),
            )
            .await;
        StagingArea::discard(&artifacts.all()).await;

        finalize.map_err(|e| ProcessError::Internal(e.to_string()))
    }

    /// Idempotency gate: refuse ids that are already claimed, then claim atomically
    async fn admit(&self, job: &VideoJob) -> Result<(), ProcessError> {
        let state = self
            .statuses
            .state(&job.video_id)
            .await
            .map_err(|e| ProcessError::Internal(e.to_string()))?;

        if state != JobState::Absent {
            return Err(ProcessError::Conflict(format!("record is {:?}", state)));
        }

        let claimed = self
            .statuses
            .claim(&VideoRecord::processing(job))
            .await
            .map_err(|e| ProcessError::Internal(e.to_string()))?;

        if !claimed {
            return Err(ProcessError::Conflict("claimed by a concurrent request".to_string()));
        }

        info!(uid = %job.uid, "Video marked as processing");
        Ok(())
    }

    async fn download(&self, job: &VideoJob, artifacts: &StagedArtifacts) -> Result<(), ProcessError> {
        match self
            .blobs
            .download(&self.settings.raw_bucket, &job.object_name, &artifacts.raw)
            .await
        {
            Ok(size) => {
                info!(size = size, "Raw video downloaded");
                Ok(())
            }
            Err(BlobStoreError::NotFound { .. }) => {
                Err(ProcessError::NotFound(job.object_name.clone()))
            }
            Err(e) => Err(ProcessError::Download(e.to_string())),
        }
    }

    /// Upload both artifacts concurrently and make them public. Waits for
    /// both sides even when one fails.
    async fn publish(&self, job: &VideoJob, artifacts: &StagedArtifacts) -> Result<(), ProcessError> {
        let processed = async {
            self.blobs
                .upload(&self.settings.processed_bucket, &artifacts.processed, &job.output_name)
                .await?;
            self.blobs
                .make_public(&self.settings.processed_bucket, &job.output_name)
                .await
        };
        let thumbnail = async {
            self.blobs
                .upload(&self.settings.thumbnail_bucket, &artifacts.thumbnail, &job.thumbnail_name)
                .await?;
            self.blobs
                .make_public(&self.settings.thumbnail_bucket, &job.thumbnail_name)
                .await
        };

        match futures::future::join(processed, thumbnail).await {
            (Ok(()), Ok(())) => {
                info!("Processed video and thumbnail published");
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => Err(ProcessError::PublishFailure(e.to_string())),
        }
    }
}
