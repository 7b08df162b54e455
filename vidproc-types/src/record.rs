//! Video status records
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::VideoJob;

/// Stored lifecycle status of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Processing,
    Processed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(VideoStatus::Processing),
            "processed" => Some(VideoStatus::Processed),
            _ => None,
        }
    }
}

/// Result of the idempotency lookup.
///
/// `Absent` covers both "no record" and "record without a status"; either
/// way the video has not been claimed by a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Absent,
    Processing,
    Processed,
}

impl JobState {
    /// True when another job already owns this video
    pub fn is_claimed(&self) -> bool {
        !matches!(self, JobState::Absent)
    }
}

impl From<Option<VideoStatus>> for JobState {
    fn from(status: Option<VideoStatus>) -> Self {
        match status {
            None => JobState::Absent,
            Some(VideoStatus::Processing) => JobState::Processing,
            Some(VideoStatus::Processed) => JobState::Processed,
        }
    }
}

/// Status record keyed by video id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Record written when a job claims a video
    pub fn processing(job: &VideoJob) -> Self {
        Self {
            id: job.video_id.clone(),
            uid: job.uid.clone(),
            status: Some(VideoStatus::Processing),
            filename: None,
            thumbnail_url: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from(self.status)
    }

    /// Merge the fields present in `patch`; `id` and `uid` are kept once set.
    pub fn apply(&mut self, patch: &VideoRecordPatch) {
        if self.id.is_empty() {
            if let Some(id) = &patch.id {
                self.id = id.clone();
            }
        }
        if self.uid.is_empty() {
            if let Some(uid) = &patch.uid {
                self.uid = uid.clone();
            }
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(filename) = &patch.filename {
            self.filename = Some(filename.clone());
        }
        if let Some(thumbnail_url) = &patch.thumbnail_url {
            self.thumbnail_url = Some(thumbnail_url.clone());
        }
        if self.created_at.is_none() {
            self.created_at = patch.created_at;
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = Some(updated_at);
        }
    }
}

/// Partial record for upserts; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&VideoRecord> for VideoRecordPatch {
    fn from(record: &VideoRecord) -> Self {
        Self {
            id: Some(record.id.clone()),
            uid: Some(record.uid.clone()),
            status: record.status,
            filename: record.filename.clone(),
            thumbnail_url: record.thumbnail_url.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl VideoRecordPatch {
    /// Patch written once both artifacts are published
    pub fn processed(filename: impl Into<String>, thumbnail_url: impl Into<String>) -> Self {
        Self {
            status: Some(VideoStatus::Processed),
            filename: Some(filename.into()),
            thumbnail_url: Some(thumbnail_url.into()),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Build a new record from this patch
    pub fn into_record(self, id: &str) -> VideoRecord {
        let mut record = VideoRecord {
            id: String::new(),
            uid: String::new(),
            status: None,
            filename: None,
            thumbnail_url: None,
            created_at: None,
            updated_at: None,
        };
        record.apply(&self);
        if record.id.is_empty() {
            record.id = id.to_string();
        }
        record
    }
}
