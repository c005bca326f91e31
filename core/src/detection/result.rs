use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detection::bbox::DetectedBox;
use crate::playback::timeline;
use crate::prelude::{OverlayError, OverlayResult};

/// Which kind of media a recognition ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Multipart field name the recognition service expects the file under.
    pub fn form_field(&self) -> &'static str {
        self.as_str()
    }
}

/// Boxes detected on one sampled video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub frame_index: usize,
    pub boxes: Vec<DetectedBox>,
}

/// Detection output for a single image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageRecognition {
    pub boxes: Vec<DetectedBox>,
    pub prompt: Option<String>,
    pub image_path: Option<String>,
    pub output_path: Option<String>,
    pub error_log: Option<String>,
}

/// Detection output for a whole video, one entry per sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecognition {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frames: Vec<FrameResult>,
    pub prompt: Option<String>,
    pub video_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Image(ImageRecognition),
    Video(VideoRecognition),
}

#[derive(Deserialize)]
struct WireImage {
    #[serde(default)]
    boxes: Option<Vec<DetectedBox>>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    error_log: Option<String>,
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    frame: Option<usize>,
    #[serde(default)]
    boxes: Option<Vec<DetectedBox>>,
}

#[derive(Deserialize)]
struct WireVideo {
    fps: f64,
    width: u32,
    height: u32,
    #[serde(default)]
    results: Vec<WireFrame>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    video_path: Option<String>,
}

fn service_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

fn validate_boxes(boxes: &[DetectedBox]) -> OverlayResult<()> {
    boxes.iter().try_for_each(DetectedBox::validate)
}

impl ImageRecognition {
    pub fn from_value(value: Value) -> OverlayResult<Self> {
        if let Some(err) = service_error(&value) {
            return Err(OverlayError::RecognitionFailed(err));
        }
        let wire: WireImage = serde_json::from_value(value)
            .map_err(|e| OverlayError::MalformedResult(e.to_string()))?;
        let boxes = wire.boxes.unwrap_or_default();
        validate_boxes(&boxes)?;
        Ok(Self {
            boxes,
            prompt: wire.prompt,
            image_path: wire.image_path,
            output_path: wire.output_path,
            error_log: wire.error_log.filter(|log| !log.trim().is_empty()),
        })
    }
}

impl VideoRecognition {
    pub fn from_value(value: Value) -> OverlayResult<Self> {
        if let Some(err) = service_error(&value) {
            return Err(OverlayError::RecognitionFailed(err));
        }
        let wire: WireVideo = serde_json::from_value(value)
            .map_err(|e| OverlayError::MalformedResult(e.to_string()))?;

        if !wire.fps.is_finite() || wire.fps <= 0.0 {
            return Err(OverlayError::MalformedResult(format!(
                "fps must be positive, got {}",
                wire.fps
            )));
        }
        if wire.width == 0 || wire.height == 0 {
            return Err(OverlayError::MalformedResult(format!(
                "resolution must be non-zero, got {}x{}",
                wire.width, wire.height
            )));
        }

        let mut frames = Vec::with_capacity(wire.results.len());
        for (position, frame) in wire.results.into_iter().enumerate() {
            let frame_index = frame.frame.unwrap_or(position);
            if frame_index != position {
                return Err(OverlayError::MalformedResult(format!(
                    "frame at position {} is labeled {}",
                    position, frame_index
                )));
            }
            let boxes = frame.boxes.unwrap_or_default();
            validate_boxes(&boxes)?;
            frames.push(FrameResult { frame_index, boxes });
        }

        Ok(Self {
            fps: wire.fps,
            width: wire.width,
            height: wire.height,
            frames,
            prompt: wire.prompt,
            video_path: wire.video_path,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn select_frame(&self, frame_index: usize) -> OverlayResult<&[DetectedBox]> {
        timeline::select_frame(frame_index, self)
    }

    /// Number of boxes on each sampled frame, in frame order.
    pub fn box_counts(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.boxes.len()).collect()
    }

    pub fn total_boxes(&self) -> usize {
        self.frames.iter().map(|f| f.boxes.len()).sum()
    }

    pub fn average_boxes_per_frame(&self) -> f64 {
        self.total_boxes() as f64 / self.frames.len().max(1) as f64
    }
}

impl Recognition {
    pub fn from_value(kind: MediaKind, value: Value) -> OverlayResult<Self> {
        match kind {
            MediaKind::Image => ImageRecognition::from_value(value).map(Recognition::Image),
            MediaKind::Video => VideoRecognition::from_value(value).map(Recognition::Video),
        }
    }

    pub fn parse_str(kind: MediaKind, raw: &str) -> OverlayResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| OverlayError::MalformedResult(e.to_string()))?;
        Self::from_value(kind, value)
    }

    /// Guesses the media kind of an untagged result payload.
    pub fn infer_kind(value: &Value) -> MediaKind {
        if value.get("results").is_some() || value.get("fps").is_some() {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Recognition::Image(_) => MediaKind::Image,
            Recognition::Video(_) => MediaKind::Video,
        }
    }
}
