use std::path::PathBuf;

pub use crate::detection::{DetectedBox, FrameResult, ImageRecognition, Recognition, VideoRecognition};
pub use crate::render::{OverlayRenderer, OverlayStyle, RasterSurface, Surface};

/// Common error type for the overlay core.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    #[error("frame index {index} out of range for {len} frames")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid media: {0}")]
    InvalidMedia(String),
    #[error("malformed recognition result: {0}")]
    MalformedResult(String),
    #[error("recognition failed: {0}")]
    RecognitionFailed(String),
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type OverlayResult<T> = Result<T, OverlayError>;
