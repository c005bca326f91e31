use crate::service::RecognitionClient;
use crate::workflow::config::AnnotatorConfig;
use anyhow::{bail, Context};
use log::{info, warn};
use overlaycore::detection::{
    DetectedBox, HistoryEntry, ImageRecognition, MediaKind, Recognition, RecognizeResponse,
    VideoRecognition,
};
use overlaycore::playback::{
    clamp_frame_index, frame_index_for_time, open_source, FrameSource, ImageSequence, StillImage,
};
use overlaycore::render::OverlayRenderer;
use overlaycore::telemetry::MetricsRecorder;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which sampled frame an offline video render should show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSelector {
    Index(usize),
    Time(f64),
}

#[derive(Clone)]
pub struct Runner {
    config: AnnotatorConfig,
    client: RecognitionClient,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: AnnotatorConfig) -> anyhow::Result<Self> {
        let client = RecognitionClient::new(&config.service_url, config.timeout())?;
        Ok(Self {
            config,
            client,
            metrics: Arc::new(MetricsRecorder::new()),
        })
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn client(&self) -> &RecognitionClient {
        &self.client
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    fn renderer(&self, kind: MediaKind) -> OverlayRenderer {
        OverlayRenderer::new(self.config.overlay_style(kind)).with_metrics(self.metrics.clone())
    }

    fn ensure_output_dir(&self) -> anyhow::Result<&Path> {
        let dir = self.config.output_dir.as_path();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Composites `result` over the image at `media` and writes
    /// `annotated_<stem>.png` into the output directory.
    pub fn render_image(&self, media: &Path, result: &ImageRecognition) -> anyhow::Result<PathBuf> {
        let still =
            StillImage::open(media).with_context(|| format!("opening image {}", media.display()))?;
        let mut surface = self.config.surface()?;
        let mut renderer = self.renderer(MediaKind::Image);
        renderer
            .render_image(still.image(), result, &mut surface)
            .context("rendering image overlay")?;

        let stem = media
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        let target = self.ensure_output_dir()?.join(format!("annotated_{}.png", stem));
        surface
            .save(&target)
            .with_context(|| format!("writing {}", target.display()))?;
        info!("wrote {} ({} boxes)", target.display(), result.boxes.len());
        Ok(target)
    }

    /// Renders every sampled frame from a directory of extracted frames into
    /// `frame_NNNN.png` files.
    pub fn render_video(
        &self,
        frames_dir: &Path,
        result: &VideoRecognition,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let source = ImageSequence::open_dir(frames_dir)
            .with_context(|| format!("opening frame directory {}", frames_dir.display()))?;
        let mut count = result.frame_count();
        if source.len() < count {
            warn!(
                "{} holds {} frames but the result has {}; rendering the first {}",
                frames_dir.display(),
                source.len(),
                count,
                source.len()
            );
            count = source.len();
        }

        let out_dir = self.ensure_output_dir()?.to_path_buf();
        let mut surface = self.config.surface()?;
        let mut renderer = self.renderer(MediaKind::Video);
        let mut written = Vec::with_capacity(count);
        for index in 0..count {
            renderer
                .render_video_frame(&source, result, index, &mut surface)
                .with_context(|| format!("rendering frame {}", index))?;
            let target = out_dir.join(format!("frame_{:04}.png", index));
            surface
                .save(&target)
                .with_context(|| format!("writing {}", target.display()))?;
            written.push(target);
        }
        info!("wrote {} annotated frames to {}", written.len(), out_dir.display());
        Ok(written)
    }

    /// Renders a saved result over local media without contacting the service.
    ///
    /// Video results pick their frame from `selector` (frame 0 by default);
    /// the derived index is clamped to the sampled frames.
    pub fn render_offline(
        &self,
        result: &Recognition,
        media: &Path,
        selector: Option<FrameSelector>,
    ) -> anyhow::Result<PathBuf> {
        match result {
            Recognition::Image(image) => self.render_image(media, image),
            Recognition::Video(video) => {
                let source = open_source(media)
                    .with_context(|| format!("opening media {}", media.display()))?;
                let mut surface = self.config.surface()?;
                let mut renderer = self.renderer(MediaKind::Video);
                let (raw, shown) = match selector.unwrap_or(FrameSelector::Index(0)) {
                    FrameSelector::Time(secs) => {
                        let shown = renderer
                            .render_at_time(source.as_ref(), video, secs, &mut surface)
                            .with_context(|| format!("rendering time {:.3}s", secs))?;
                        (frame_index_for_time(secs, video.fps), shown)
                    }
                    FrameSelector::Index(index) => match clamp_frame_index(index, video.frame_count()) {
                        Some(clamped) => {
                            renderer
                                .render_video_frame(source.as_ref(), video, clamped, &mut surface)
                                .with_context(|| format!("rendering frame {}", clamped))?;
                            (index, Some(clamped))
                        }
                        None => {
                            let bare = source.frame(0).context("reading first frame")?;
                            renderer
                                .render_frame(&bare, &[], &mut surface)
                                .context("rendering bare frame")?;
                            (index, None)
                        }
                    },
                };

                let name = match shown {
                    Some(index) => format!("frame_{:04}.png", index),
                    None => "frame_empty.png".to_string(),
                };
                let target = self.ensure_output_dir()?.join(name);
                surface
                    .save(&target)
                    .with_context(|| format!("writing {}", target.display()))?;
                if shown != Some(raw) {
                    info!("requested frame {} shown as {:?}", raw, shown);
                }
                Ok(target)
            }
        }
    }
}

/// Reads a saved result from disk.
///
/// Accepts a raw result document, a full recognize response envelope, or a
/// history entry whose `result` field holds the document as a string.
pub fn load_saved_result(path: &Path) -> anyhow::Result<Recognition> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading result {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing result {}", path.display()))?;

    if value.get("type").is_some() && value.get("result").map(Value::is_string) == Some(true) {
        let entry: HistoryEntry =
            serde_json::from_value(value).context("decoding history entry")?;
        return entry.recognition().context("validating stored result");
    }
    if value.get("success").is_some() {
        let result = value.get("result").cloned().unwrap_or(Value::Null);
        let kind = Recognition::infer_kind(&result);
        let envelope: RecognizeResponse =
            serde_json::from_value(value).context("decoding recognize response")?;
        return envelope
            .into_recognition(kind)
            .context("validating saved response");
    }
    if !value.is_object() {
        bail!("{} does not hold a result object", path.display());
    }
    let kind = Recognition::infer_kind(&value);
    Recognition::from_value(kind, value).context("validating saved result")
}

/// One line per box: label, confidence and corners.
pub fn describe_boxes(boxes: &[DetectedBox]) -> Vec<String> {
    boxes
        .iter()
        .enumerate()
        .map(|(i, b)| format!("  {}. {}", i + 1, b.describe()))
        .collect()
}

/// Per-frame listing of a video result.
pub fn describe_video(video: &VideoRecognition) -> Vec<String> {
    let mut lines = vec![format!(
        "{} sampled frames at {:.2} fps ({}x{}), {} boxes",
        video.frame_count(),
        video.fps,
        video.width,
        video.height,
        video.total_boxes()
    )];
    for frame in &video.frames {
        lines.push(format!(
            "frame {}: {} boxes",
            frame.frame_index,
            frame.boxes.len()
        ));
        lines.extend(describe_boxes(&frame.boxes));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use serde_json::json;
    use tempfile::tempdir;

    fn runner_in(out: &Path) -> Runner {
        let cfg = AnnotatorConfig {
            output_dir: out.to_path_buf(),
            ..Default::default()
        };
        Runner::new(cfg).unwrap()
    }

    fn write_png(path: &Path) {
        RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]))
            .save(path)
            .unwrap();
    }

    fn video_result(frames: usize) -> VideoRecognition {
        let results: Vec<Value> = (0..frames)
            .map(|i| json!({"frame": i, "boxes": [{"x1": 2, "y1": 8, "x2": 10, "y2": 15, "label": "car", "confidence": 0.5}]}))
            .collect();
        VideoRecognition::from_value(json!({"fps": 10.0, "width": 20, "height": 20, "results": results}))
            .unwrap()
    }

    #[test]
    fn render_image_writes_annotated_png() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("cat.png");
        write_png(&media);
        let runner = runner_in(&dir.path().join("out"));
        let result = ImageRecognition {
            boxes: vec![DetectedBox::new(2.0, 8.0, 10.0, 15.0, "cat", 0.9)],
            ..Default::default()
        };
        let target = runner.render_image(&media, &result).unwrap();
        assert!(target.ends_with("annotated_cat.png"));

        let written = image::open(&target).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (20, 20));
        assert_eq!(written.get_pixel(2, 12), &Rgba([0x18, 0x90, 0xFF, 255]));
        assert_eq!(runner.metrics().snapshot().boxes_drawn, 1);
    }

    #[test]
    fn render_video_stops_at_available_frames() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        write_png(&frames.join("f_000.png"));
        write_png(&frames.join("f_001.png"));
        let runner = runner_in(&dir.path().join("out"));

        let written = runner.render_video(&frames, &video_result(3)).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("frame_0001.png"));
        let frame = image::open(&written[0]).unwrap().to_rgba8();
        assert_eq!(frame.get_pixel(2, 12), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn offline_render_clamps_time_to_last_frame() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("poster.png");
        write_png(&media);
        let runner = runner_in(&dir.path().join("out"));
        let result = Recognition::Video(video_result(3));
        let target = runner
            .render_offline(&result, &media, Some(FrameSelector::Time(5.0)))
            .unwrap();
        assert!(target.ends_with("frame_0002.png"));

        let first = runner
            .render_offline(&result, &media, Some(FrameSelector::Time(0.15)))
            .unwrap();
        assert!(first.ends_with("frame_0001.png"));
    }

    #[test]
    fn offline_render_of_empty_video_paints_bare_frame() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("poster.png");
        write_png(&media);
        let runner = runner_in(&dir.path().join("out"));
        let result = Recognition::Video(video_result(0));
        let target = runner.render_offline(&result, &media, None).unwrap();
        assert!(target.ends_with("frame_empty.png"));
        assert_eq!(runner.metrics().snapshot().boxes_drawn, 0);
    }

    #[test]
    fn saved_results_load_in_every_shape() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw.json");
        fs::write(&raw, r#"{"boxes": [{"x1": 1, "y1": 1, "x2": 2, "y2": 2, "label": "a", "confidence": 0.1}]}"#).unwrap();
        assert_eq!(load_saved_result(&raw).unwrap().kind(), MediaKind::Image);

        let envelope = dir.path().join("envelope.json");
        fs::write(
            &envelope,
            r#"{"success": true, "result": {"fps": 30, "width": 4, "height": 4, "results": []}}"#,
        )
        .unwrap();
        assert_eq!(load_saved_result(&envelope).unwrap().kind(), MediaKind::Video);

        let entry = dir.path().join("entry.json");
        fs::write(
            &entry,
            r#"{"id": 1, "type": "image", "prompt": "a", "file_path": "uploads/a.jpg", "result": "{\"boxes\": []}", "timestamp": "t"}"#,
        )
        .unwrap();
        match load_saved_result(&entry).unwrap() {
            Recognition::Image(image) => assert!(image.boxes.is_empty()),
            other => panic!("unexpected {:?}", other),
        }

        let list = dir.path().join("list.json");
        fs::write(&list, "[1, 2]").unwrap();
        assert!(load_saved_result(&list).is_err());
    }

    #[test]
    fn video_listing_names_every_frame() {
        let lines = describe_video(&video_result(2));
        assert!(lines[0].starts_with("2 sampled frames"));
        assert_eq!(lines[1], "frame 0: 1 boxes");
        assert_eq!(lines[2], "  1. car 50.00% (2, 8) - (10, 15)");
    }
}
