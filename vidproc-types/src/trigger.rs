//! Trigger payload naming the uploaded object

use serde::Deserialize;

use crate::error::{ProcessError, Result};

/// Decoded trigger message. Fields other than `name` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerPayload {
    #[serde(default)]
    pub name: Option<String>,
}

impl TriggerPayload {
    /// Parse the JSON message body
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProcessError::BadRequest(e.to_string()))
    }

    /// Object name, rejecting a missing or empty one
    pub fn object_name(&self) -> Result<&str> {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ProcessError::BadRequest(
                "Invalid message payload received.".to_string(),
            )),
        }
    }
}
