//! Error types for the video processing pipeline
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


use thiserror::Error;

/// Terminal failures of a processing request.
///
/// The `Display` output is the message returned to the caller; the inner
/// strings carry detail for logs only where the message is fixed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Trigger payload could not be decoded or carried no object name
    #[error("Bad Request: missing filename.")]
    BadRequest(String),

    /// Object name cannot be turned into a usable video id
    #[error("Bad Request: invalid filename {0}.")]
    InvalidObjectName(String),

    /// A record for this video is already processing or processed
    #[error("Bad Request: video already processing or processed")]
    Conflict(String),

    /// Raw object missing from the raw bucket
    #[error("Error: Raw video {0} not found in bucket.")]
    NotFound(String),

    /// Any other download failure
    #[error("Error downloading raw video: {0}")]
    Download(String),

    #[error("Processing failed")]
    TranscodeFailure(String),

    #[error("Thumbnail generation failed")]
    ThumbnailFailure(String),

    #[error("Upload failed")]
    PublishFailure(String),

    /// Status store or other unexpected fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ProcessError::BadRequest(_)
            | ProcessError::InvalidObjectName(_)
            | ProcessError::Conflict(_) => 400,
            ProcessError::NotFound(_) => 404,
            ProcessError::Download(_)
            | ProcessError::TranscodeFailure(_)
            | ProcessError::ThumbnailFailure(_)
            | ProcessError::PublishFailure(_)
            | ProcessError::Internal(_) => 500,
        }
    }

    /// Underlying cause, for logging
    pub fn detail(&self) -> &str {
        match self {
            ProcessError::BadRequest(detail)
            | ProcessError::InvalidObjectName(detail)
            | ProcessError::Conflict(detail)
            | ProcessError::NotFound(detail)
            | ProcessError::Download(detail)
            | ProcessError::TranscodeFailure(detail)
            | ProcessError::ThumbnailFailure(detail)
            | ProcessError::PublishFailure(detail)
            | ProcessError::Internal(detail) => detail,
        }
    }
}

/// Terminal response of one processing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResponse {
    pub status_code: u16,
    pub message: String,
}

impl ProcessResponse {
    pub const SUCCESS_MESSAGE: &'static str = "Processing finished successfully";

    pub fn success() -> Self {
        Self {
            status_code: 200,
            message: Self::SUCCESS_MESSAGE.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<&ProcessError> for ProcessResponse {
    fn from(error: &ProcessError) -> Self {
        Self {
            status_code: error.status_code(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ProcessError::BadRequest("eof".into()).status_code(), 400);
        assert_eq!(ProcessError::Conflict("u1-1".into()).status_code(), 400);
        assert_eq!(ProcessError::NotFound("a.mp4".into()).status_code(), 404);
        assert_eq!(ProcessError::TranscodeFailure("exit 1".into()).status_code(), 500);
        assert_eq!(ProcessError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_fixed_messages_hide_detail() {
        let error = ProcessError::TranscodeFailure("ffmpeg exited with 1".into());
        assert_eq!(error.to_string(), "Processing failed");
        assert_eq!(error.detail(), "ffmpeg exited with 1");

        let response = ProcessResponse::from(&ProcessError::ThumbnailFailure("x".into()));
        assert_eq!(response.status_code, 500);
        assert_eq!(response.message, "Thumbnail generation failed");
    }

    #[test]
    fn test_not_found_message_names_object() {
        let error = ProcessError::NotFound("u1-1700000000000.mp4".into());
        assert_eq!(
            error.to_string(),
            "Error: Raw video u1-1700000000000.mp4 not found in bucket."
        );
    }
}
