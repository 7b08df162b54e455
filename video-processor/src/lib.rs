//! Video Processor Library
//!
//! Processes one uploaded video per request:
//! - Idempotency claim against the status store
//! - Download from the raw bucket into local staging
//! - Transcode to a fixed height and extract a thumbnail
//! - Publish both artifacts and mark the record processed
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


pub mod codec;
pub mod pipeline;
pub mod server;
pub mod staging;
pub mod status;
pub mod storage;

pub use codec::{CodecError, FfmpegCodec, MediaCodec};
pub use pipeline::{PipelineSettings, VideoPipeline};
pub use staging::{StagedArtifacts, StagingArea};
pub use status::{FirestoreStatusStore, MemoryStatusStore, StatusStore, StatusStoreError};
pub use storage::{BlobStore, BlobStoreError, LocalBlobStore, ObjectStorage};
