//! Identifiers derived from an uploaded object name
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


use crate::error::{ProcessError, Result};

/// Prefix of the processed object key
pub const PROCESSED_PREFIX: &str = "processed-";

/// Extension of generated thumbnails
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Video id: the object name up to the first `.`
pub fn video_id(object_name: &str) -> &str {
    object_name
        .split_once('.')
        .map_or(object_name, |(head, _)| head)
}

/// Owner id: the video id up to the first `-`
pub fn owner_uid(video_id: &str) -> &str {
    video_id.split_once('-').map_or(video_id, |(head, _)| head)
}

pub fn output_name(object_name: &str) -> String {
    format!("{}{}", PROCESSED_PREFIX, object_name)
}

pub fn thumbnail_name(video_id: &str) -> String {
    format!("{}.{}", video_id, THUMBNAIL_EXTENSION)
}

/// All names one processing request works with.
///
/// Uploaded names follow `<uid>-<millis>.<ext>`. Names without a `-` are
/// accepted and yield `uid == video_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub object_name: String,
    pub video_id: String,
    pub uid: String,
    pub output_name: String,
    pub thumbnail_name: String,
}

impl VideoJob {
    /// Derive the job identifiers, rejecting names that would escape a
    /// staging directory, produce an empty id, or carry no extension.
    pub fn from_object_name(object_name: &str) -> Result<Self> {
        if object_name.contains('/') || object_name.contains('\\') || object_name.contains("..") {
            return Err(ProcessError::InvalidObjectName(object_name.to_string()));
        }

        // ffmpeg picks the output container from the extension
        let has_extension = object_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| !ext.is_empty());

        let video_id = video_id(object_name);
        if video_id.is_empty() || !has_extension {
            return Err(ProcessError::InvalidObjectName(object_name.to_string()));
        }

        Ok(Self {
            object_name: object_name.to_string(),
            video_id: video_id.to_string(),
            uid: owner_uid(video_id).to_string(),
            output_name: output_name(object_name),
            thumbnail_name: thumbnail_name(video_id),
        })
    }
}
