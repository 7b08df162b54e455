//! Object Storage - download/upload/ACL operations against the blob store
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
use futures::StreamExt;
use rusoto_core::{request::HttpClient, Region, RusotoError};
use rusoto_credential::StaticProvider;
use rusoto_s3::{GetObjectError, GetObjectRequest, PutObjectAclRequest, PutObjectRequest, S3Client, S3};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vidproc_config::ObjectStorageConfig;

/// Canned ACL that makes an object readable without credentials
const PUBLIC_READ_ACL: &str = "public-read";

/// Errors reported by blob store adapters
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("object storage request failed: {0}")]
    Request(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote object store addressed by bucket and key
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `bucket/key` into `destination`, returning the byte count
    async fn download(&self, bucket: &str, key: &str, destination: &Path)
        -> Result<u64, BlobStoreError>;

    /// Upload the local file `source` to `bucket/key`
    async fn upload(&self, bucket: &str, source: &Path, key: &str) -> Result<(), BlobStoreError>;

    /// Make `bucket/key` publicly readable
    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError>;

    /// Backend name, for logs and health output
    fn backend_name(&self) -> &str;
}

/// Public URL of an object: `https://<host>/<bucket>/<key>`
pub fn public_url(host: &str, bucket: &str, key: &str) -> String {
    format!("https://{}/{}/{}", host.trim_end_matches('/'), bucket, key)
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "webm" => "video/webm",
        Some(ext) if ext == "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// S3-compatible object storage client (GCS interoperability endpoint)
pub struct ObjectStorage {
    client: S3Client,
    endpoint: String,
}

impl ObjectStorage {
    /// Create a new object storage client
    pub fn new(config: &ObjectStorageConfig) -> Result<Self, BlobStoreError> {
        let endpoint = Self::extract_endpoint(&config.endpoint);

        info!(
            endpoint = endpoint,
            "Initializing object storage client"
        );

        let credentials = StaticProvider::new_minimal(
            config.access_key.clone(),
            config.secret_key.clone(),
        );

        let region = Region::Custom {
            name: config.region.clone().unwrap_or_else(|| "auto".to_string()),
            endpoint: endpoint.clone(),
        };

        let http_client = HttpClient::new()
            .map_err(|e| BlobStoreError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: S3Client::new_with(http_client, credentials, region),
            endpoint,
        })
    }

    /// Normalize the configured endpoint to a full URL
    fn extract_endpoint(endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", endpoint.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, BlobStoreError> {
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        };

        let result = self.client.get_object(request).await.map_err(|e| match e {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            // GCS answers missing objects with a bare 404 in interoperability mode
            RusotoError::Unknown(ref response) if response.status.as_u16() == 404 => {
                BlobStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            }
            other => BlobStoreError::Request(format!("Failed to download {}/{}: {}", bucket, key, other)),
        })?;

        let mut body = result
            .body
            .ok_or_else(|| BlobStoreError::Request("Object response has no body".to_string()))?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut total_bytes = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            total_bytes += chunk.len() as u64;
        }
        file.flush().await?;

        info!(
            bucket = bucket,
            key = key,
            size = total_bytes,
            destination = %destination.display(),
            "Object downloaded"
        );

        Ok(total_bytes)
    }

    async fn upload(&self, bucket: &str, source: &Path, key: &str) -> Result<(), BlobStoreError> {
        let file_content = tokio::fs::read(source).await?;
        let size = file_content.len();

        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: Some(file_content.into()),
            content_type: Some(content_type_for(key).to_string()),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| BlobStoreError::Request(format!("Failed to upload {}/{}: {}", bucket, key, e)))?;

        info!(
            source = %source.display(),
            bucket = bucket,
            key = key,
            size = size,
            "Object uploaded"
        );

        Ok(())
    }

    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        let request = PutObjectAclRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            acl: Some(PUBLIC_READ_ACL.to_string()),
            ..Default::default()
        };

        self.client.put_object_acl(request).await.map_err(|e| {
            BlobStoreError::Request(format!("Failed to make {}/{} public: {}", bucket, key, e))
        })?;

        debug!(endpoint = self.endpoint, bucket = bucket, key = key, "Object made public");
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "s3"
    }
}

/// Directory-backed blob store for local development.
///
/// Each bucket is a subdirectory of `root`; objects are plain files.
pub struct LocalBlobStore {
    root: PathBuf,
    public: Mutex<HashSet<(String, String)>>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public: Mutex::new(HashSet::new()),
        }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    /// Store `content` directly, e.g. to seed a raw upload
    pub async fn put_bytes(&self, bucket: &str, key: &str, content: &[u8]) -> Result<(), BlobStoreError> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    pub fn exists(&self, bucket: &str, key: &str) -> bool {
        self.object_path(bucket, key).is_file()
    }

    pub fn is_public(&self, bucket: &str, key: &str) -> bool {
        self.public
            .lock()
            .map(|set| set.contains(&(bucket.to_string(), key.to_string())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, BlobStoreError> {
        let source = self.object_path(bucket, key);
        if !source.is_file() {
            return Err(BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let size = tokio::fs::copy(&source, destination).await?;
        debug!(bucket = bucket, key = key, size = size, "Local object downloaded");
        Ok(size)
    }

    async fn upload(&self, bucket: &str, source: &Path, key: &str) -> Result<(), BlobStoreError> {
        let destination = self.object_path(bucket, key);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &destination).await?;
        debug!(bucket = bucket, key = key, "Local object uploaded");
        Ok(())
    }

    async fn make_public(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        if !self.exists(bucket, key) {
            return Err(BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.public
            .lock()
            .map_err(|_| BlobStoreError::Request("public set lock poisoned".to_string()))?
            .insert((bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}
