//! Configuration management for vidproc services

use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Bucket names for the three artifact classes
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    pub raw: String,
    pub processed: String,
    pub thumbnails: String,
}

/// Object storage configuration (S3-compatible endpoint)
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

/// Local staging directories
#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
}

/// Firestore status store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub collection: String,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
}

/// Codec (FFmpeg) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CodecConfig {
    pub ffmpeg_path: String,
    pub target_height: u32,
    pub thumbnail_offset_secs: u32,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub buckets: BucketConfig,
    /// `None` selects the directory-backed development blob store
    pub object_storage: Option<ObjectStorageConfig>,
    pub public_storage_host: String,
    pub local_blob_root: PathBuf,
    pub staging: StagingConfig,
    /// `None` selects the in-memory status store
    pub firestore: Option<FirestoreConfig>,
    pub codec: CodecConfig,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // Object storage is configured only when both HMAC keys are present
        let object_storage = if let (Some(access_key), Some(secret_key)) = (
            lookup("OBJECT_STORAGE_ACCESS_KEY"),
            lookup("OBJECT_STORAGE_SECRET_KEY"),
        ) {
            Some(ObjectStorageConfig {
                endpoint: var("OBJECT_STORAGE_ENDPOINT", "https://storage.googleapis.com"),
                access_key,
                secret_key,
                region: Some(var("OBJECT_STORAGE_REGION", "auto")),
            })
        } else {
            None
        };

        let firestore = lookup("GOOGLE_CLOUD_PROJECT").map(|project_id| FirestoreConfig {
            project_id,
            collection: var("FIRESTORE_COLLECTION", "videos"),
            emulator_host: lookup("FIRESTORE_EMULATOR_HOST"),
            access_token: lookup("GOOGLE_ACCESS_TOKEN"),
        });

        Ok(Self {
            port: parse_var(&lookup, "PORT", 8080)?,
            buckets: BucketConfig {
                raw: var("RAW_VIDEO_BUCKET", "fc-yt-raw-videos"),
                processed: var("PROCESSED_VIDEO_BUCKET", "fc-yt-processed-videos"),
                thumbnails: var("THUMBNAIL_BUCKET", "fc-yt-thumbnails"),
            },
            object_storage,
            public_storage_host: var("PUBLIC_STORAGE_HOST", "storage.googleapis.com"),
            local_blob_root: PathBuf::from(var("LOCAL_BLOB_ROOT", "/tmp/vidproc-blobs")),
            staging: StagingConfig {
                raw_dir: PathBuf::from(var("LOCAL_RAW_VIDEO_PATH", "/tmp/raw-videos")),
                processed_dir: PathBuf::from(var(
                    "LOCAL_PROCESSED_VIDEO_PATH",
                    "/tmp/processed-videos",
                )),
                thumbnail_dir: PathBuf::from(var("LOCAL_THUMBNAIL_PATH", "/tmp/thumbnails")),
            },
            firestore,
            codec: CodecConfig {
                ffmpeg_path: var("FFMPEG_PATH", "ffmpeg"),
                target_height: parse_var(&lookup, "TARGET_HEIGHT", 360)?,
                thumbnail_offset_secs: parse_var(&lookup, "THUMBNAIL_OFFSET_SECS", 5)?,
            },
            log_level: Some(var("LOG_LEVEL", "info")),
            log_format: Some(var("LOG_FORMAT", "console")),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Get log format, defaulting to "console"
    pub fn log_format(&self) -> &str {
        self.log_format.as_deref().unwrap_or("console")
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
