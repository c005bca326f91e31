//! JSON envelopes exchanged with the recognition and history services.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::detection::result::{MediaKind, Recognition};
use crate::prelude::{OverlayError, OverlayResult};

/// Body of `POST /api/recognize/{image,video}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RecognizeResponse {
    /// Validates the envelope and the embedded result for the given media kind.
    pub fn into_recognition(self, kind: MediaKind) -> OverlayResult<Recognition> {
        if !self.success {
            return Err(OverlayError::RecognitionFailed(
                self.error.unwrap_or_else(|| "service reported failure".into()),
            ));
        }
        let result = self
            .result
            .ok_or_else(|| OverlayError::MalformedResult("response has no result".into()))?;
        Recognition::from_value(kind, result)
    }
}

/// One stored recognition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub file_path: String,
    /// Result payload as the service stored it: a JSON document in a string.
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn recognition(&self) -> OverlayResult<Recognition> {
        Recognition::parse_str(self.kind, &self.result)
    }

    /// Human-readable summary of what the run detected.
    pub fn summary(&self) -> String {
        match self.recognition() {
            Ok(Recognition::Image(image)) => format!("{} objects", image.boxes.len()),
            Ok(Recognition::Video(video)) => format!(
                "{} frames, average {:.2} objects per frame",
                video.frame_count(),
                video.average_boxes_per_frame()
            ),
            Err(err) => format!("unreadable result ({})", err),
        }
    }

    /// File name of the stored upload, accepting either path separator.
    pub fn upload_file_name(&self) -> &str {
        file_name(&self.file_path)
    }
}

/// Body of `GET /api/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET /api/history/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItemResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub item: Option<HistoryEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `DELETE /api/history/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Last path component, split on `/` or `\`.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Message carried by a non-2xx body: its `error` field, else the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// File name sent with a multipart upload.
pub fn upload_name(file: &Path, kind: MediaKind) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("upload.{}", kind.as_str()))
}
