use image::Rgba;
use serde::{Deserialize, Serialize};

/// Where a label chip goes relative to its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipPlacement {
    /// Directly above the top edge, even when that runs off the canvas.
    #[default]
    Above,
    /// Above the top edge, pushed down so the chip never starts above row 0.
    Clamped,
}

/// Colors and metrics used to draw boxes and label chips.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub box_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    pub line_width: f32,
    pub chip_height: f32,
    pub chip_padding: f32,
    pub font_size: f32,
    pub placement: ChipPlacement,
}

impl OverlayStyle {
    /// Red boxes with white labels, used for video frames.
    pub fn video() -> Self {
        Self {
            box_color: Rgba([0xFF, 0x00, 0x00, 0xFF]),
            text_color: Rgba([0xFF, 0xFF, 0xFF, 0xFF]),
            line_width: 2.0,
            chip_height: 20.0,
            chip_padding: 10.0,
            font_size: 14.0,
            placement: ChipPlacement::Above,
        }
    }

    /// Blue boxes with white labels, used for still images.
    pub fn image() -> Self {
        Self {
            box_color: Rgba([0x18, 0x90, 0xFF, 0xFF]),
            ..Self::video()
        }
    }

    pub fn with_placement(mut self, placement: ChipPlacement) -> Self {
        self.placement = placement;
        self
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::video()
    }
}
