use image::{Rgba, RgbaImage};

/// Axis-aligned rectangle in surface pixels, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl OverlayRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// 2D drawing target the overlay renderer paints on.
///
/// Modeled on an immediate-mode canvas: resizing clears the pixel buffer,
/// and text is positioned by its baseline.
pub trait Surface {
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    /// Draws `media` at the origin, unscaled.
    fn draw_image(&mut self, media: &RgbaImage);
    fn stroke_rect(&mut self, rect: OverlayRect, color: Rgba<u8>, line_width: f32);
    fn fill_rect(&mut self, rect: OverlayRect, color: Rgba<u8>);
    fn measure_text(&self, text: &str, font_size: f32) -> f32;
    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, font_size: f32, color: Rgba<u8>);
}
