pub mod bbox;
pub mod result;
pub mod wire;

pub use bbox::DetectedBox;
pub use result::{FrameResult, ImageRecognition, MediaKind, Recognition, VideoRecognition};
pub use wire::{
    DeleteResponse, HistoryEntry, HistoryItemResponse, HistoryResponse, RecognizeResponse,
};
