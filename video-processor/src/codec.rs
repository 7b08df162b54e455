//! Media Codec - FFmpeg invocations for transcoding and frame extraction
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
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors reported by codec adapters
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed ({status}): {stderr}")]
    Failed {
        operation: &'static str,
        status: String,
        stderr: String,
    },
}

/// Video transcoding and frame extraction
#[async_trait]
pub trait MediaCodec: Send + Sync {
    /// Scale `source` to `height` pixels (aspect preserved) into `destination`
    async fn transcode(&self, source: &Path, destination: &Path, height: u32) -> Result<(), CodecError>;

    /// Write one still frame taken `timestamp_secs` into `source` as `dest_dir/dest_name`
    async fn extract_frame(
        &self,
        source: &Path,
        dest_dir: &Path,
        dest_name: &str,
        timestamp_secs: u32,
    ) -> Result<(), CodecError>;
}

/// Codec backed by the `ffmpeg` command-line tool
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg_path: String,
}

impl FfmpegCodec {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Check whether the configured binary runs
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    fn transcode_args(source: &Path, destination: &Path, height: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(source.into());
        args.push("-vf".into());
        // -2 keeps the width even, which most encoders require
        args.push(format!("scale=-2:{}", height).into());
        args.push(destination.into());
        args
    }

    fn frame_args(source: &Path, destination: &Path, timestamp_secs: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-ss"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(timestamp_secs.to_string().into());
        args.push("-i".into());
        args.push(source.into());
        for arg in ["-frames:v", "1", "-q:v", "2"] {
            args.push(arg.into());
        }
        args.push(destination.into());
        args
    }

    async fn run(
        &self,
        operation: &'static str,
        args: Vec<OsString>,
        output: &Path,
    ) -> Result<(), CodecError> {
        debug!(operation = operation, args = ?args, "Running ffmpeg");

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CodecError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!(operation = operation, status = %result.status, stderr = %stderr, "ffmpeg failed");
            return Err(CodecError::Failed {
                operation,
                status: describe_status(result.status),
                stderr,
            });
        }

        // ffmpeg exits 0 without writing anything when the seek lands past the end
        if !output.is_file() {
            return Err(CodecError::Failed {
                operation,
                status: describe_status(result.status),
                stderr: format!("no output written to {}", output.display()),
            });
        }

        info!(operation = operation, output = %output.display(), "ffmpeg finished");
        Ok(())
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[async_trait]
impl MediaCodec for FfmpegCodec {
    async fn transcode(&self, source: &Path, destination: &Path, height: u32) -> Result<(), CodecError> {
        let args = Self::transcode_args(source, destination, height);
        self.run("transcode", args, destination).await
    }

    async fn extract_frame(
        &self,
        source: &Path,
        dest_dir: &Path,
        dest_name: &str,
        timestamp_secs: u32,
    ) -> Result<(), CodecError> {
        let destination = dest_dir.join(dest_name);
        let args = Self::frame_args(source, &destination, timestamp_secs);
        self.run("thumbnail", args, &destination).await
    }
}
