use crate::detection::{DetectedBox, VideoRecognition};
use crate::prelude::{OverlayError, OverlayResult};

/// Maps a playback position to the sampled frame shown at that instant.
///
/// Computes `floor(t * fps)` without clamping to the frame count; callers
/// clamp with [`clamp_frame_index`] before indexing. Negative or non-finite
/// inputs saturate to frame 0.
pub fn frame_index_for_time(current_time_secs: f64, fps: f64) -> usize {
    let position = current_time_secs * fps;
    if !position.is_finite() || position <= 0.0 {
        return 0;
    }
    position.floor() as usize
}

/// Clamps a frame index into `[0, len - 1]`, or `None` when there are no frames.
pub fn clamp_frame_index(index: usize, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(index.min(len - 1))
    }
}

/// Boxes of the given sampled frame.
pub fn select_frame(frame_index: usize, result: &VideoRecognition) -> OverlayResult<&[DetectedBox]> {
    result
        .frames
        .get(frame_index)
        .map(|frame| frame.boxes.as_slice())
        .ok_or(OverlayError::IndexOutOfRange {
            index: frame_index,
            len: result.frames.len(),
        })
}
