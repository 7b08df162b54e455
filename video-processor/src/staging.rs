//! Local staging directories for raw, processed and thumbnail files
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


use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use vidproc_config::StagingConfig;
use vidproc_types::VideoJob;

#[derive(Error, Debug)]
#[error("staging path {path}: {source}")]
pub struct StagingError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The three staging directories
#[derive(Debug, Clone)]
pub struct StagingArea {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    thumbnail_dir: PathBuf,
}

/// Local paths used by one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifacts {
    pub raw: PathBuf,
    pub processed: PathBuf,
    pub thumbnail: PathBuf,
}

impl StagedArtifacts {
    pub fn all(&self) -> [&Path; 3] {
        [
            self.raw.as_path(),
            self.processed.as_path(),
            self.thumbnail.as_path(),
        ]
    }
}

impl StagingArea {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            raw_dir: config.raw_dir.clone(),
            processed_dir: config.processed_dir.clone(),
            thumbnail_dir: config.thumbnail_dir.clone(),
        }
    }

    /// Create all staging directories. Idempotent.
    pub async fn ensure_directories(&self) -> Result<(), StagingError> {
        for dir in [&self.raw_dir, &self.processed_dir, &self.thumbnail_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|source| StagingError {
                path: dir.clone(),
                source,
            })?;
        }
        info!(
            raw = %self.raw_dir.display(),
            processed = %self.processed_dir.display(),
            thumbnails = %self.thumbnail_dir.display(),
            "Staging directories ready"
        );
        Ok(())
    }

    pub fn raw_path(&self, name: &str) -> PathBuf {
        self.raw_dir.join(name)
    }

    pub fn processed_path(&self, name: &str) -> PathBuf {
        self.processed_dir.join(name)
    }

    pub fn thumbnail_path(&self, name: &str) -> PathBuf {
        self.thumbnail_dir.join(name)
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    pub fn artifacts(&self, job: &VideoJob) -> StagedArtifacts {
        StagedArtifacts {
            raw: self.raw_path(&job.object_name),
            processed: self.processed_path(&job.output_name),
            thumbnail: self.thumbnail_path(&job.thumbnail_name),
        }
    }

    /// Delete `path`. A missing file is not an error; returns whether a file was removed.
    pub async fn delete_if_exists(path: &Path) -> Result<bool, StagingError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted staged file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StagingError {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Best-effort removal of staged files; failures are logged and skipped
    pub async fn discard(paths: &[&Path]) {
        for path in paths {
            if let Err(e) = Self::delete_if_exists(path).await {
                warn!(error = %e, "Failed to delete staged file");
            }
        }
    }
}
