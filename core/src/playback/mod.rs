pub mod media;
pub mod timeline;

pub use media::{open_source, FrameSource, ImageSequence, StillImage};
pub use timeline::{clamp_frame_index, frame_index_for_time, select_frame};
