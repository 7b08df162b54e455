//! Status Store - video records keyed by video id
//!
//! Two backends are provided:
//! - [`FirestoreStatusStore`] talks to the Firestore REST API (or its emulator)
//! - [`MemoryStatusStore`] keeps records in process, for development and tests
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


use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use vidproc_config::FirestoreConfig;
use vidproc_types::{JobState, VideoRecord, VideoRecordPatch, VideoStatus};

/// GCE/Cloud Run metadata server token endpoint
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh cached tokens this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Errors reported by status store adapters
#[derive(Error, Debug)]
pub enum StatusStoreError {
    #[error("status store request failed: {0}")]
    Request(String),

    #[error("unexpected status store response: {0}")]
    Decode(String),

    #[error("status store authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for StatusStoreError {
    fn from(error: reqwest::Error) -> Self {
        StatusStoreError::Request(error.to_string())
    }
}

/// Key-value store of video status records
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Fetch the record for `id`, if any
    async fn get(&self, id: &str) -> Result<Option<VideoRecord>, StatusStoreError>;

    /// Merge `patch` into the record for `id`, creating it when missing
    async fn upsert(&self, id: &str, patch: &VideoRecordPatch) -> Result<(), StatusStoreError>;

    /// Atomically write `record` unless a record with a status already
    /// exists for its id. Returns `false` when another job holds the id.
    async fn claim(&self, record: &VideoRecord) -> Result<bool, StatusStoreError>;

    /// Backend name, for logs and health output
    fn backend_name(&self) -> &str;

    /// Lifecycle state of `id`
    async fn state(&self, id: &str) -> Result<JobState, StatusStoreError> {
        Ok(self
            .get(id)
            .await?
            .map_or(JobState::Absent, |record| record.state()))
    }
}

/// In-process status store
#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<String, VideoRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record as-is
    pub async fn insert(&self, record: VideoRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, id: &str) -> Result<Option<VideoRecord>, StatusStoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn upsert(&self, id: &str, patch: &VideoRecordPatch) -> Result<(), StatusStoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => record.apply(patch),
            None => {
                records.insert(id.to_string(), patch.clone().into_record(id));
            }
        }
        Ok(())
    }

    async fn claim(&self, record: &VideoRecord) -> Result<bool, StatusStoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) if existing.state().is_claimed() => Ok(false),
            Some(existing) => {
                existing.apply(&VideoRecordPatch::from(record));
                Ok(true)
            }
            None => {
                records.insert(record.id.clone(), record.clone());
                Ok(true)
            }
        }
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Where Firestore bearer tokens come from
enum TokenSource {
    /// Emulator: no authentication
    None,
    /// Fixed token from configuration
    Static(String),
    /// Metadata server, cached until shortly before expiry
    Metadata(Mutex<Option<(String, Instant)>>),
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Firestore document as returned by the REST API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

/// Firestore-backed status store
pub struct FirestoreStatusStore {
    http: reqwest::Client,
    collection_url: Url,
    token_source: TokenSource,
}

/// Append `segments` to `base`, percent-encoding each one so that ids
/// containing `#`, `?`, `%` or `/` stay a single path segment
fn with_segments(base: &Url, segments: &[&str]) -> Result<Url, StatusStoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StatusStoreError::Request(format!("{} cannot carry a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl FirestoreStatusStore {
    /// Create a new Firestore client
    pub fn new(config: &FirestoreConfig) -> Result<Self, StatusStoreError> {
        let (base_url, token_source) = match (&config.emulator_host, &config.access_token) {
            (Some(host), _) => (format!("http://{}", host), TokenSource::None),
            (None, Some(token)) => (
                "https://firestore.googleapis.com".to_string(),
                TokenSource::Static(token.clone()),
            ),
            (None, None) => (
                "https://firestore.googleapis.com".to_string(),
                TokenSource::Metadata(Mutex::new(None)),
            ),
        };

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if config.emulator_host.is_some() {
            // the emulator is local; never route it through a proxy
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| StatusStoreError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&base_url)
            .map_err(|e| StatusStoreError::Request(format!("Invalid Firestore host {}: {}", base_url, e)))?;
        let collection_url = with_segments(
            &base_url,
            &[
                "v1",
                "projects",
                &config.project_id,
                "databases",
                "(default)",
                "documents",
                &config.collection,
            ],
        )?;

        info!(
            collection_url = %collection_url,
            "Initializing Firestore status store"
        );

        Ok(Self {
            http,
            collection_url,
            token_source,
        })
    }

    fn document_url(&self, id: &str) -> Result<Url, StatusStoreError> {
        with_segments(&self.collection_url, &[id])
    }

    async fn bearer_token(&self) -> Result<Option<String>, StatusStoreError> {
        match &self.token_source {
            TokenSource::None => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Metadata(cache) => {
                let mut cache = cache.lock().await;
                if let Some((token, expires_at)) = cache.as_ref() {
                    if Instant::now() + TOKEN_EXPIRY_MARGIN < *expires_at {
                        return Ok(Some(token.clone()));
                    }
                }

                let response = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| StatusStoreError::Auth(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(StatusStoreError::Auth(format!(
                        "metadata server returned {}",
                        response.status()
                    )));
                }

                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| StatusStoreError::Auth(e.to_string()))?;

                debug!(expires_in = token.expires_in, "Fetched access token from metadata server");
                let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
                *cache = Some((token.access_token.clone(), expires_at));
                Ok(Some(token.access_token))
            }
        }
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, StatusStoreError> {
        Ok(match self.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn fetch_document(&self, id: &str) -> Result<Option<Document>, StatusStoreError> {
        let request = self.authorized(self.http.get(self.document_url(id)?)).await?;
        let response = request.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: Document = response
                    .json()
                    .await
                    .map_err(|e| StatusStoreError::Decode(e.to_string()))?;
                Ok(Some(document))
            }
            status => Err(StatusStoreError::Request(format!(
                "GET {} returned {}",
                id, status
            ))),
        }
    }

    /// PATCH the fields of `patch`, optionally guarded by an update-time precondition.
    /// Returns the response status for the caller to interpret.
    async fn patch_document(
        &self,
        id: &str,
        patch: &VideoRecordPatch,
        update_time: Option<&str>,
    ) -> Result<StatusCode, StatusStoreError> {
        let fields = encode_fields(patch);
        let mut query: Vec<(&str, String)> = fields
            .keys()
            .map(|field| ("updateMask.fieldPaths", field.clone()))
            .collect();
        if let Some(update_time) = update_time {
            query.push(("currentDocument.updateTime", update_time.to_string()));
        }

        let request = self
            .http
            .patch(self.document_url(id)?)
            .query(&query)
            .json(&json!({ "fields": fields }));
        let response = self.authorized(request).await?.send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl StatusStore for FirestoreStatusStore {
    async fn get(&self, id: &str) -> Result<Option<VideoRecord>, StatusStoreError> {
        match self.fetch_document(id).await? {
            Some(document) => decode_record(id, &document.fields).map(Some),
            None => Ok(None),
        }
    }

    async fn upsert(&self, id: &str, patch: &VideoRecordPatch) -> Result<(), StatusStoreError> {
        let status = self.patch_document(id, patch, None).await?;
        if !status.is_success() {
            return Err(StatusStoreError::Request(format!(
                "PATCH {} returned {}",
                id, status
            )));
        }
        debug!(video_id = id, "Status record upserted");
        Ok(())
    }

    async fn claim(&self, record: &VideoRecord) -> Result<bool, StatusStoreError> {
        let patch = VideoRecordPatch::from(record);

        // createDocument fails with 409 when the document already exists
        let request = self
            .http
            .post(self.collection_url.clone())
            .query(&[("documentId", record.id.as_str())])
            .json(&json!({ "fields": encode_fields(&patch) }));
        let response = self.authorized(request).await?.send().await?;

        match response.status() {
            status if status.is_success() => return Ok(true),
            StatusCode::CONFLICT => {}
            status => {
                return Err(StatusStoreError::Request(format!(
                    "create {} returned {}",
                    record.id, status
                )))
            }
        }

        // A document exists. Take it over only if it carries no status, and
        // only if nobody wrote it since we looked.
        let Some(document) = self.fetch_document(&record.id).await? else {
            return Ok(false);
        };
        if decode_record(&record.id, &document.fields)?.state().is_claimed() {
            return Ok(false);
        }
        let Some(update_time) = document.update_time.as_deref() else {
            return Ok(false);
        };

        let status = self.patch_document(&record.id, &patch, Some(update_time)).await?;
        if status.is_success() {
            Ok(true)
        } else if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
        ) {
            warn!(video_id = record.id, status = %status, "Lost claim on existing record");
            Ok(false)
        } else {
            Err(StatusStoreError::Request(format!(
                "PATCH {} returned {}",
                record.id, status
            )))
        }
    }

    fn backend_name(&self) -> &str {
        "firestore"
    }
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn timestamp_value(value: &DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

/// Firestore `fields` map for the fields present in `patch`
fn encode_fields(patch: &VideoRecordPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(id) = &patch.id {
        fields.insert("id".to_string(), string_value(id));
    }
    if let Some(uid) = &patch.uid {
        fields.insert("uid".to_string(), string_value(uid));
    }
    if let Some(status) = patch.status {
        fields.insert("status".to_string(), string_value(status.as_str()));
    }
    if let Some(filename) = &patch.filename {
        fields.insert("filename".to_string(), string_value(filename));
    }
    if let Some(thumbnail_url) = &patch.thumbnail_url {
        fields.insert("thumbnailUrl".to_string(), string_value(thumbnail_url));
    }
    if let Some(created_at) = &patch.created_at {
        fields.insert("createdAt".to_string(), timestamp_value(created_at));
    }
    if let Some(updated_at) = &patch.updated_at {
        fields.insert("updatedAt".to_string(), timestamp_value(updated_at));
    }
    fields
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name)?.get("stringValue")?.as_str()
}

fn timestamp_field(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(name)?.get("timestampValue")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Build a record from Firestore fields. A missing status means the record
/// is unclaimed; an unknown status string is an error.
fn decode_record(id: &str, fields: &Map<String, Value>) -> Result<VideoRecord, StatusStoreError> {
    let status = match string_field(fields, "status") {
        Some(raw) => Some(VideoStatus::parse(raw).ok_or_else(|| {
            StatusStoreError::Decode(format!("unknown status '{}' on {}", raw, id))
        })?),
        None => None,
    };

    Ok(VideoRecord {
        id: string_field(fields, "id").unwrap_or(id).to_string(),
        uid: string_field(fields, "uid").unwrap_or_default().to_string(),
        status,
        filename: string_field(fields, "filename").map(str::to_string),
        thumbnail_url: string_field(fields, "thumbnailUrl").map(str::to_string),
        created_at: timestamp_field(fields, "createdAt"),
        updated_at: timestamp_field(fields, "updatedAt"),
    })
}
