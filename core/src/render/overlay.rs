use std::sync::Arc;

use image::RgbaImage;

use crate::detection::{DetectedBox, ImageRecognition, VideoRecognition};
use crate::playback::{clamp_frame_index, frame_index_for_time, select_frame, FrameSource};
use crate::prelude::{OverlayError, OverlayResult};
use crate::render::style::{ChipPlacement, OverlayStyle};
use crate::render::surface::{OverlayRect, Surface};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Composites detection boxes over media frames.
///
/// The only state carried between calls is the last rendered frame index,
/// so an overlay can be redrawn (after a resize, say) without re-deriving
/// the index from playback time.
pub struct OverlayRenderer {
    style: OverlayStyle,
    last_frame: Option<usize>,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            last_frame: None,
            logger: LogManager::scoped("overlay"),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: OverlayStyle) {
        self.style = style;
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.last_frame
    }

    /// Forgets the last rendered frame, e.g. when new media is loaded.
    pub fn reset(&mut self) {
        self.last_frame = None;
    }

    /// Paints `media` and then every box, in order, onto `surface`.
    ///
    /// The surface is resized to the media's intrinsic pixel size so that
    /// box coordinates map 1:1 onto surface pixels.
    pub fn render_frame<S: Surface + ?Sized>(
        &self,
        media: &RgbaImage,
        boxes: &[DetectedBox],
        surface: &mut S,
    ) -> OverlayResult<()> {
        let (width, height) = media.dimensions();
        if width == 0 || height == 0 {
            return Err(OverlayError::InvalidMedia(format!(
                "media must be at least 1x1, got {}x{}",
                width, height
            )));
        }

        surface.resize(width, height);
        surface.draw_image(media);
        for detected in boxes {
            self.draw_box(detected, surface);
        }

        self.metrics.record_render(boxes.len());
        self.logger
            .detail(&format!("rendered {}x{} with {} boxes", width, height, boxes.len()));
        Ok(())
    }

    /// Renders an image result; the image counts as frame 0.
    pub fn render_image<S: Surface + ?Sized>(
        &mut self,
        media: &RgbaImage,
        result: &ImageRecognition,
        surface: &mut S,
    ) -> OverlayResult<()> {
        self.render_frame(media, &result.boxes, surface)?;
        self.last_frame = Some(0);
        Ok(())
    }

    /// Renders one sampled video frame and remembers its index.
    pub fn render_video_frame<S: Surface + ?Sized>(
        &mut self,
        source: &dyn FrameSource,
        result: &VideoRecognition,
        frame_index: usize,
        surface: &mut S,
    ) -> OverlayResult<()> {
        self.paint_video_frame(source, result, frame_index, surface)?;
        self.last_frame = Some(frame_index);
        Ok(())
    }

    /// Renders the frame shown at `current_time_secs` of playback.
    ///
    /// The derived index is clamped to the sampled frames. A result with no
    /// frames paints the bare media and returns `None`.
    pub fn render_at_time<S: Surface + ?Sized>(
        &mut self,
        source: &dyn FrameSource,
        result: &VideoRecognition,
        current_time_secs: f64,
        surface: &mut S,
    ) -> OverlayResult<Option<usize>> {
        let raw = frame_index_for_time(current_time_secs, result.fps);
        match clamp_frame_index(raw, result.frame_count()) {
            Some(index) => {
                self.render_video_frame(source, result, index, surface)?;
                Ok(Some(index))
            }
            None => {
                let media = source.frame(0)?;
                self.render_frame(&media, &[], surface)?;
                self.last_frame = None;
                Ok(None)
            }
        }
    }

    /// Redraws the last rendered frame; `None` when nothing was rendered yet.
    pub fn rerender<S: Surface + ?Sized>(
        &self,
        source: &dyn FrameSource,
        result: &VideoRecognition,
        surface: &mut S,
    ) -> OverlayResult<Option<usize>> {
        match self.last_frame {
            Some(index) => {
                self.paint_video_frame(source, result, index, surface)?;
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    fn paint_video_frame<S: Surface + ?Sized>(
        &self,
        source: &dyn FrameSource,
        result: &VideoRecognition,
        frame_index: usize,
        surface: &mut S,
    ) -> OverlayResult<()> {
        let boxes = select_frame(frame_index, result)?;
        let media = source.frame(frame_index)?;
        if media.dimensions() != (result.width, result.height) {
            self.logger.detail(&format!(
                "frame {} is {}x{} but boxes are in {}x{} space",
                frame_index,
                media.width(),
                media.height(),
                result.width,
                result.height
            ));
        }
        self.render_frame(&media, boxes, surface)
    }

    fn draw_box<S: Surface + ?Sized>(&self, detected: &DetectedBox, surface: &mut S) {
        let style = &self.style;
        surface.stroke_rect(
            OverlayRect::new(detected.x1, detected.y1, detected.width(), detected.height()),
            style.box_color,
            style.line_width,
        );

        let text_width = surface.measure_text(&detected.label, style.font_size);
        let chip = self.chip_rect(detected, text_width);
        surface.fill_rect(chip, style.box_color);

        let inset = style.chip_padding / 2.0;
        let baseline = chip.y + chip.height - inset;
        surface.fill_text(
            &detected.label,
            chip.x + inset,
            baseline,
            style.font_size,
            style.text_color,
        );
    }

    /// Label chip for a box: padded text width by a fixed height, sitting on the top edge.
    pub fn chip_rect(&self, detected: &DetectedBox, text_width: f32) -> OverlayRect {
        let style = &self.style;
        let above = detected.y1 - style.chip_height;
        let y = match style.placement {
            ChipPlacement::Above => above,
            ChipPlacement::Clamped => above.max(0.0),
        };
        OverlayRect::new(
            detected.x1,
            y,
            text_width + style.chip_padding,
            style.chip_height,
        )
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FrameResult;
    use crate::playback::StillImage;
    use image::Rgba;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Resize(u32, u32),
        Image(u32, u32),
        Stroke(OverlayRect),
        Fill(OverlayRect),
        Text(String, f32, f32),
    }

    /// Records draw calls instead of touching pixels.
    #[derive(Default)]
    struct RecordingSurface {
        size: (u32, u32),
        ops: Vec<Op>,
    }

    impl Surface for RecordingSurface {
        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
            self.ops.push(Op::Resize(width, height));
        }

        fn size(&self) -> (u32, u32) {
            self.size
        }

        fn draw_image(&mut self, media: &RgbaImage) {
            self.ops.push(Op::Image(media.width(), media.height()));
        }

        fn stroke_rect(&mut self, rect: OverlayRect, _color: Rgba<u8>, _line_width: f32) {
            self.ops.push(Op::Stroke(rect));
        }

        fn fill_rect(&mut self, rect: OverlayRect, _color: Rgba<u8>) {
            self.ops.push(Op::Fill(rect));
        }

        fn measure_text(&self, text: &str, _font_size: f32) -> f32 {
            text.len() as f32 * 8.0
        }

        fn fill_text(&mut self, text: &str, x: f32, baseline: f32, _font_size: f32, _color: Rgba<u8>) {
            self.ops.push(Op::Text(text.to_string(), x, baseline));
        }
    }

    fn cat() -> DetectedBox {
        DetectedBox::new(10.0, 30.0, 50.0, 90.0, "cat", 0.92)
    }

    fn three_frames() -> VideoRecognition {
        VideoRecognition {
            fps: 30.0,
            width: 64,
            height: 48,
            frames: vec![
                FrameResult { frame_index: 0, boxes: vec![] },
                FrameResult { frame_index: 1, boxes: vec![cat()] },
                FrameResult { frame_index: 2, boxes: vec![cat(), cat()] },
            ],
            prompt: None,
            video_path: None,
        }
    }

    #[test]
    fn rectangle_matches_box_corners() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        renderer
            .render_frame(&RgbaImage::new(100, 100), &[cat()], &mut surface)
            .unwrap();
        assert!(surface.ops.contains(&Op::Stroke(OverlayRect::new(10.0, 30.0, 40.0, 60.0))));
    }

    #[test]
    fn chip_sits_above_box_with_padded_width() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        renderer
            .render_frame(&RgbaImage::new(100, 100), &[cat()], &mut surface)
            .unwrap();
        assert_eq!(
            surface.ops[3],
            Op::Fill(OverlayRect::new(10.0, 10.0, 24.0 + 10.0, 20.0))
        );
        assert_eq!(surface.ops[4], Op::Text("cat".into(), 15.0, 25.0));
    }

    #[test]
    fn surface_takes_media_size_regardless_of_prior_size() {
        let renderer = OverlayRenderer::default();
        let mut surface = crate::render::RasterSurface::new(1920, 1080);
        renderer
            .render_frame(&RgbaImage::new(64, 48), &[], &mut surface)
            .unwrap();
        assert_eq!(surface.size(), (64, 48));
    }

    #[test]
    fn empty_boxes_paint_only_the_base_frame() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        renderer
            .render_frame(&RgbaImage::new(20, 10), &[], &mut surface)
            .unwrap();
        assert_eq!(surface.ops, vec![Op::Resize(20, 10), Op::Image(20, 10)]);

        let base = RgbaImage::from_pixel(20, 10, Rgba([9, 8, 7, 255]));
        let mut raster = crate::render::RasterSurface::new(1, 1);
        renderer.render_frame(&base, &[], &mut raster).unwrap();
        assert_eq!(raster.image(), &base);
    }

    #[test]
    fn boxes_are_drawn_in_given_order() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        let first = DetectedBox::new(0.0, 40.0, 5.0, 45.0, "a", 0.1);
        let second = DetectedBox::new(1.0, 41.0, 6.0, 46.0, "b", 0.2);
        renderer
            .render_frame(&RgbaImage::new(50, 50), &[first, second], &mut surface)
            .unwrap();
        let labels: Vec<_> = surface
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Text(t, _, _) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn raster_output_carries_stroke_and_chip_pixels() {
        let renderer = OverlayRenderer::default();
        let media = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let b = DetectedBox::new(10.0, 25.0, 20.0, 35.0, "", 0.5);
        let mut surface = crate::render::RasterSurface::new(1, 1);
        renderer.render_frame(&media, &[b], &mut surface).unwrap();

        let red = Rgba([255, 0, 0, 255]);
        let img = surface.image();
        assert_eq!(img.get_pixel(10, 30), &red);
        assert_eq!(img.get_pixel(12, 15), &red);
        assert_eq!(img.get_pixel(15, 30), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn chip_near_top_edge_is_left_off_canvas_by_default() {
        let renderer = OverlayRenderer::default();
        let near_top = DetectedBox::new(5.0, 4.0, 30.0, 30.0, "dog", 0.7);
        assert_eq!(renderer.chip_rect(&near_top, 20.0).y, -16.0);

        let clamped = OverlayRenderer::new(OverlayStyle::video().with_placement(ChipPlacement::Clamped));
        assert_eq!(clamped.chip_rect(&near_top, 20.0).y, 0.0);
        assert_eq!(clamped.chip_rect(&cat(), 20.0).y, 10.0);
    }

    #[test]
    fn empty_media_is_rejected() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        assert!(matches!(
            renderer.render_frame(&RgbaImage::new(0, 0), &[], &mut surface),
            Err(OverlayError::InvalidMedia(_))
        ));
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn render_at_time_clamps_and_remembers_frame() {
        let mut renderer = OverlayRenderer::default();
        let source = StillImage::new(RgbaImage::new(64, 48)).unwrap();
        let result = three_frames();
        let mut surface = RecordingSurface::default();

        let shown = renderer.render_at_time(&source, &result, 0.04, &mut surface).unwrap();
        assert_eq!(shown, Some(1));
        assert_eq!(renderer.last_frame(), Some(1));

        let shown = renderer.render_at_time(&source, &result, 12.0, &mut surface).unwrap();
        assert_eq!(shown, Some(2));
    }

    #[test]
    fn rerender_repeats_last_frame_without_time() {
        let mut renderer = OverlayRenderer::default();
        let source = StillImage::new(RgbaImage::new(64, 48)).unwrap();
        let result = three_frames();

        let mut before = RecordingSurface::default();
        assert_eq!(renderer.rerender(&source, &result, &mut before).unwrap(), None);
        assert!(before.ops.is_empty());

        renderer.render_video_frame(&source, &result, 2, &mut before).unwrap();
        let mut again = RecordingSurface::default();
        assert_eq!(renderer.rerender(&source, &result, &mut again).unwrap(), Some(2));
        assert_eq!(before.ops, again.ops);
    }

    #[test]
    fn out_of_range_frame_is_an_error_not_a_read() {
        let mut renderer = OverlayRenderer::default();
        let source = StillImage::new(RgbaImage::new(64, 48)).unwrap();
        let result = three_frames();
        let mut surface = RecordingSurface::default();
        assert!(matches!(
            renderer.render_video_frame(&source, &result, 5, &mut surface),
            Err(OverlayError::IndexOutOfRange { index: 5, len: 3 })
        ));
        assert_eq!(renderer.last_frame(), None);
    }

    #[test]
    fn empty_video_renders_bare_media() {
        let mut renderer = OverlayRenderer::default();
        let source = StillImage::new(RgbaImage::new(8, 8)).unwrap();
        let mut result = three_frames();
        result.frames.clear();
        let mut surface = RecordingSurface::default();
        assert_eq!(renderer.render_at_time(&source, &result, 1.0, &mut surface).unwrap(), None);
        assert_eq!(surface.ops, vec![Op::Resize(8, 8), Op::Image(8, 8)]);
    }

    #[test]
    fn renders_are_counted() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::default();
        renderer
            .render_frame(&RgbaImage::new(10, 10), &[cat(), cat()], &mut surface)
            .unwrap();
        let snap = renderer.metrics().snapshot();
        assert_eq!(snap.frames_rendered, 1);
        assert_eq!(snap.boxes_drawn, 2);
    }
}
