use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::prelude::{OverlayError, OverlayResult};
use crate::render::surface::{OverlayRect, Surface};

/// Advance per character, in em, used when no font is loaded.
const FALLBACK_ADVANCE_EM: f32 = 0.5;

/// RGBA pixel buffer surface.
pub struct RasterSurface {
    canvas: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn load_font<P: AsRef<Path>>(path: P) -> OverlayResult<FontArc> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        FontArc::try_from_vec(bytes).map_err(|e| OverlayError::Font {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> OverlayResult<()> {
        self.canvas.save(path)?;
        Ok(())
    }
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Pixel rect for a float rect, clipped to a `canvas`-sized buffer.
///
/// Zero-extent rects still cover one pixel. `None` when nothing of the rect
/// lands on the canvas, which also keeps huge coordinates away from the
/// integer arithmetic in imageproc.
fn pixel_rect(x: f32, y: f32, width: f32, height: f32, canvas: (u32, u32)) -> Option<Rect> {
    if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
        return None;
    }
    let width = width.round();
    let height = height.round();
    if width < 0.0 || height < 0.0 {
        return None;
    }
    let left = x.round();
    let top = y.round();
    let right = (left + width.max(1.0)).min(canvas.0 as f32);
    let bottom = (top + height.max(1.0)).min(canvas.1 as f32);
    let left = left.max(0.0);
    let top = top.max(0.0);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}

impl Surface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn draw_image(&mut self, media: &RgbaImage) {
        imageops::replace(&mut self.canvas, media, 0, 0);
    }

    fn stroke_rect(&mut self, rect: OverlayRect, color: Rgba<u8>, line_width: f32) {
        // A stroke straddles the path: half the width outside, half inside.
        // Each ring is drawn edge by edge so clipping never invents an edge
        // along the canvas border.
        let canvas = self.canvas.dimensions();
        let line_width = line_width.round().max(1.0) as i32;
        let outer = line_width / 2;
        for ring in 0..line_width {
            let inset = (ring - outer) as f32;
            let x = rect.x + inset;
            let y = rect.y + inset;
            let width = (rect.width - 2.0 * inset).round();
            let height = (rect.height - 2.0 * inset).round();
            if width < 0.0 || height < 0.0 {
                continue;
            }
            let right = x + (width - 1.0).max(0.0);
            let bottom = y + (height - 1.0).max(0.0);
            let edges = [
                pixel_rect(x, y, width, 1.0, canvas),
                pixel_rect(x, bottom, width, 1.0, canvas),
                pixel_rect(x, y, 1.0, height, canvas),
                pixel_rect(right, y, 1.0, height, canvas),
            ];
            for edge in edges.into_iter().flatten() {
                draw_filled_rect_mut(&mut self.canvas, edge, color);
            }
        }
    }

    fn fill_rect(&mut self, rect: OverlayRect, color: Rgba<u8>) {
        if let Some(r) = pixel_rect(rect.x, rect.y, rect.width, rect.height, self.canvas.dimensions()) {
            draw_filled_rect_mut(&mut self.canvas, r, color);
        }
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(font_size), font, text).0 as f32,
            None => text.chars().count() as f32 * font_size * FALLBACK_ADVANCE_EM,
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, baseline: f32, font_size: f32, color: Rgba<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(font_size);
        let ascent = font.as_scaled(scale).ascent();
        let top = baseline - ascent;
        let (width, height) = self.canvas.dimensions();
        let text_width = text_size(scale, font, text).0 as f32;
        if x >= width as f32 || x + text_width <= 0.0 || top >= height as f32 || baseline + font_size <= 0.0 {
            return;
        }
        draw_text_mut(
            &mut self.canvas,
            color,
            x.round() as i32,
            top.round() as i32,
            scale,
            font,
            text,
        );
    }
}
