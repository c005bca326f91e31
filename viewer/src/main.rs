use iced::{
    time,
    widget::{
        button, column, image::Handle, image::Image, row, scrollable, slider, text, text_input,
        Canvas, Column, Container,
    },
    Alignment, Element, Length, Subscription, Task, Theme,
};
use log::{info, warn};
use overlaycore::detection::{DetectedBox, HistoryEntry, MediaKind, Recognition};
use overlaycore::playback::{
    clamp_frame_index, frame_index_for_time, FrameSource, ImageSequence, StillImage,
};
use overlaycore::render::{ChipPlacement, OverlayRenderer, OverlayStyle, RasterSurface};
use overlaycore::session::{Completion, Session, SessionState};
use overlaycore::telemetry::MetricsRecorder;
use overlaycore::OverlayResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use timeline::DetectionTimeline;

mod api;
mod timeline;

const TICK: Duration = Duration::from_millis(100);

fn main() -> iced::Result {
    env_logger::init();
    iced::application(Viewer::boot, Viewer::update, Viewer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Viewer) -> String {
    "Detection Overlay Viewer".into()
}

fn application_subscription(state: &Viewer) -> Subscription<Message> {
    if state.playing {
        time::every(TICK).map(|_| Message::Tick)
    } else {
        Subscription::none()
    }
}

fn application_theme(_: &Viewer) -> Theme {
    Theme::Dark
}

struct Viewer {
    service_url: String,
    form: MediaForm,
    session: Session,
    loaded_path: Option<PathBuf>,
    source: Option<Box<dyn FrameSource>>,
    renderer: OverlayRenderer,
    surface: RasterSurface,
    placement: ChipPlacement,
    preview: Option<Handle>,
    current_frame: usize,
    playback_secs: f64,
    playing: bool,
    history: Vec<HistoryEntry>,
    activity: Vec<String>,
    status: String,
    metrics: Arc<MetricsRecorder>,
}

#[derive(Debug, Clone)]
enum Message {
    FieldChanged(FormField, String),
    ModeSelected(MediaKind),
    LoadMedia,
    Recognize,
    Recognized(overlaycore::session::RequestToken, Result<Recognition, String>),
    SeekFrame(u32),
    TogglePlayback,
    Tick,
    ToggleChipPlacement,
    RefreshHistory,
    HistoryFetched(Result<Vec<HistoryEntry>, String>),
    ViewHistory(i64),
    DeleteHistory(i64),
    HistoryDeleted(i64, Result<(), String>),
}

#[derive(Debug, Clone, Copy)]
enum FormField {
    MediaPath,
    FramesDir,
    Prompt,
}

#[derive(Debug, Clone)]
struct MediaForm {
    media_path: String,
    frames_dir: String,
    prompt: String,
    mode: MediaKind,
}

impl MediaForm {
    fn update_field(&mut self, field: FormField, value: String) {
        match field {
            FormField::MediaPath => self.media_path = value,
            FormField::FramesDir => self.frames_dir = value,
            FormField::Prompt => self.prompt = value,
        }
    }

    fn frames_dir(&self) -> Option<PathBuf> {
        let trimmed = self.frames_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}

impl Viewer {
    fn boot() -> (Self, Task<Message>) {
        let mut status = "Load an image or video to begin.".to_string();
        let mut surface = RasterSurface::default();
        if let Ok(path) = std::env::var("DETECT_FONT") {
            match RasterSurface::load_font(&path) {
                Ok(font) => surface = surface.with_font(font),
                Err(err) => {
                    warn!("label font {} unusable: {}", path, err);
                    status = format!("Label font unavailable ({err}); labels are not drawn.");
                }
            }
        }
        let service_url = api::service_url();
        info!("using recognition service at {}", service_url);

        (
            Viewer::new(service_url.clone(), surface, status),
            Task::perform(api::fetch_history(service_url), Message::HistoryFetched),
        )
    }

    fn new(service_url: String, surface: RasterSurface, status: String) -> Self {
        let metrics = Arc::new(MetricsRecorder::new());
        Viewer {
            service_url,
            form: MediaForm {
                media_path: String::new(),
                frames_dir: String::new(),
                prompt: String::new(),
                mode: MediaKind::Image,
            },
            session: Session::new(),
            loaded_path: None,
            source: None,
            renderer: OverlayRenderer::new(OverlayStyle::image()).with_metrics(metrics.clone()),
            surface,
            placement: ChipPlacement::Above,
            preview: None,
            current_frame: 0,
            playback_secs: 0.0,
            playing: false,
            history: Vec::new(),
            activity: Vec::new(),
            status,
            metrics,
        }
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::FieldChanged(field, value) => {
                state.form.update_field(field, value);
                Task::none()
            }
            Message::ModeSelected(mode) => {
                state.form.mode = mode;
                Task::none()
            }
            Message::LoadMedia => {
                state.load_media();
                Task::none()
            }
            Message::Recognize => state.start_recognition(),
            Message::Recognized(token, outcome) => {
                state.finish_recognition(token, outcome);
                Task::none()
            }
            Message::SeekFrame(index) => {
                state.playing = false;
                state.seek(index as usize);
                Task::none()
            }
            Message::TogglePlayback => {
                if !state.playing && state.video_frames() > 0 {
                    if state.current_frame + 1 >= state.video_frames() {
                        state.seek(0);
                    }
                    state.playing = true;
                } else {
                    state.playing = false;
                }
                Task::none()
            }
            Message::Tick => {
                state.advance_playback();
                Task::none()
            }
            Message::ToggleChipPlacement => {
                state.placement = match state.placement {
                    ChipPlacement::Above => ChipPlacement::Clamped,
                    ChipPlacement::Clamped => ChipPlacement::Above,
                };
                state.apply_style();
                state.rerender();
                Task::none()
            }
            Message::RefreshHistory => Task::perform(
                api::fetch_history(state.service_url.clone()),
                Message::HistoryFetched,
            ),
            Message::HistoryFetched(Ok(history)) => {
                state.push_activity(format!("History: {} records", history.len()));
                state.history = history;
                Task::none()
            }
            Message::HistoryFetched(Err(err)) => {
                state.status = format!("History error: {err}");
                Task::none()
            }
            Message::ViewHistory(id) => {
                state.view_history(id);
                Task::none()
            }
            Message::DeleteHistory(id) => Task::perform(
                api::delete_history(state.service_url.clone(), id),
                move |result| Message::HistoryDeleted(id, result),
            ),
            Message::HistoryDeleted(id, Ok(())) => {
                state.history.retain(|entry| entry.id != id);
                state.status = format!("Deleted history record {id}");
                state.push_activity(format!("Deleted record {id}"));
                Task::none()
            }
            Message::HistoryDeleted(id, Err(err)) => {
                state.status = format!("Delete of record {id} failed: {err}");
                Task::none()
            }
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let mode_row = row![
            button("Image")
                .on_press(Message::ModeSelected(MediaKind::Image))
                .padding(6),
            button("Video")
                .on_press(Message::ModeSelected(MediaKind::Video))
                .padding(6),
            text(format!("Mode: {}", state.form.mode.as_str())).size(14),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let can_recognize = matches!(
            state.session.state(),
            SessionState::Loaded | SessionState::Annotated | SessionState::Failed
        );
        let recognize_label = if state.session.state() == SessionState::Recognizing {
            "Recognizing..."
        } else {
            "Recognize"
        };

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No history records").size(12))
        } else {
            state
                .history
                .iter()
                .fold(Column::new().spacing(6), |col, entry| {
                    col.push(
                        column![
                            text(format!(
                                "#{} [{}] {} | {}",
                                entry.id,
                                entry.kind.as_str(),
                                entry.timestamp,
                                entry.upload_file_name()
                            ))
                            .size(12),
                            text(format!("{} | {}", entry.prompt, entry.summary())).size(12),
                            row![
                                button("View")
                                    .on_press(Message::ViewHistory(entry.id))
                                    .padding(4),
                                button("Delete")
                                    .on_press(Message::DeleteHistory(entry.id))
                                    .padding(4),
                            ]
                            .spacing(6),
                        ]
                        .spacing(2),
                    )
                })
        };

        let form_column = column![
            text("Media").size(26),
            mode_row,
            text_input("Media file", &state.form.media_path)
                .on_input(|value| Message::FieldChanged(FormField::MediaPath, value))
                .padding(6),
            text_input("Frames directory (video preview)", &state.form.frames_dir)
                .on_input(|value| Message::FieldChanged(FormField::FramesDir, value))
                .padding(6),
            text_input("What should be detected?", &state.form.prompt)
                .on_input(|value| Message::FieldChanged(FormField::Prompt, value))
                .padding(6),
            row![
                button("Load media").on_press(Message::LoadMedia).padding(10),
                button(recognize_label)
                    .on_press_maybe(can_recognize.then_some(Message::Recognize))
                    .padding(10),
            ]
            .spacing(8),
            text(&state.status).size(14),
            row![
                text("History").size(20),
                button("Refresh").on_press(Message::RefreshHistory).padding(4),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            Container::new(scrollable(history_list).height(Length::Fixed(320.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fixed(380.0));

        let preview: Element<'_, Message> = match &state.preview {
            Some(handle) => Image::<Handle>::new(handle.clone())
                .width(Length::Fill)
                .height(Length::Fixed(420.0))
                .into(),
            None => text("No preview").size(14).into(),
        };

        let mut result_column = column![
            text("Preview").size(26),
            preview,
            row![
                text(format!("Session: {}", state.session.state().name())).size(14),
                button(match state.placement {
                    ChipPlacement::Above => "Labels: above box",
                    ChipPlacement::Clamped => "Labels: kept in frame",
                })
                .on_press(Message::ToggleChipPlacement)
                .padding(4),
            ]
            .spacing(12)
            .align_y(Alignment::Center),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        if let Some(Recognition::Video(video)) = state.session.result() {
            let frames = video.frame_count();
            if frames > 0 {
                let last = (frames - 1) as u32;
                result_column = result_column
                    .push(
                        row![
                            button(if state.playing { "Pause" } else { "Play" })
                                .on_press(Message::TogglePlayback)
                                .padding(6),
                            text(frame_label(state.current_frame, frames)).size(14),
                        ]
                        .spacing(10)
                        .align_y(Alignment::Center),
                    )
                    .push(slider(
                        0..=last,
                        state.current_frame.min(frames - 1) as u32,
                        Message::SeekFrame,
                    ))
                    .push(text("Boxes per sampled frame").size(16))
                    .push(
                        Canvas::new(DetectionTimeline::new(
                            video.box_counts(),
                            Some(state.current_frame),
                        ))
                        .width(Length::Fill)
                        .height(Length::Fixed(80.0)),
                    );
            } else {
                result_column = result_column.push(text("No sampled frames in result").size(14));
            }
        }

        let box_list = state.current_boxes().iter().take(12).fold(
            Column::new().spacing(4),
            |col, detected| col.push(text(detected.describe()).size(12)),
        );
        let activity_list = state
            .activity
            .iter()
            .rev()
            .fold(Column::new().spacing(4), |col, entry| {
                col.push(text(entry.clone()).size(12))
            });

        result_column = result_column
            .push(text("Detected objects").size(16))
            .push(Container::new(box_list).padding(6))
            .push(text("Activity log").size(16))
            .push(Container::new(scrollable(activity_list).height(Length::Fixed(90.0))).padding(6));

        let layout = row![form_column, result_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn video_frames(&self) -> usize {
        match self.session.result() {
            Some(Recognition::Video(video)) => video.frame_count(),
            _ => 0,
        }
    }

    fn current_boxes(&self) -> &[DetectedBox] {
        match self.session.result() {
            Some(Recognition::Image(image)) => &image.boxes,
            Some(Recognition::Video(video)) => video.select_frame(self.current_frame).unwrap_or(&[]),
            None => &[],
        }
    }

    fn load_media(&mut self) {
        let trimmed = self.form.media_path.trim();
        if trimmed.is_empty() {
            self.status = "Choose a media file first.".into();
            return;
        }
        let path = PathBuf::from(trimmed);
        if !path.is_file() {
            self.status = format!("{} is not a file", path.display());
            return;
        }
        let kind = self.form.mode;
        let source = match open_preview_source(kind, &path, self.form.frames_dir()) {
            Ok(source) => source,
            Err(err) => {
                self.status = format!("Cannot open media: {err}");
                return;
            }
        };

        self.session.load_media(kind);
        self.install_media(kind, path, source);
        self.status = format!("{} loaded; ready to recognize.", kind.as_str());
    }

    fn install_media(&mut self, kind: MediaKind, path: PathBuf, source: Option<Box<dyn FrameSource>>) {
        self.push_activity(format!("Loaded {}", path.display()));
        self.loaded_path = Some(path);
        self.source = source;
        self.playing = false;
        self.current_frame = 0;
        self.playback_secs = 0.0;
        self.renderer.reset();
        self.renderer.set_style(style_for(kind, self.placement));
        self.render_current();
    }

    fn start_recognition(&mut self) -> Task<Message> {
        let (Some(path), Some(kind)) = (self.loaded_path.clone(), self.session.media_kind()) else {
            self.status = "Load media before recognizing.".into();
            return Task::none();
        };
        let token = match self.session.begin_recognition() {
            Ok(token) => token,
            Err(err) => {
                self.status = err.to_string();
                return Task::none();
            }
        };
        self.playing = false;
        self.current_frame = 0;
        self.playback_secs = 0.0;
        self.render_current();
        self.status = format!("Recognizing {}...", path.display());
        Task::perform(
            api::recognize(self.service_url.clone(), kind, path, self.form.prompt.clone()),
            move |outcome| Message::Recognized(token, outcome),
        )
    }

    fn finish_recognition(
        &mut self,
        token: overlaycore::session::RequestToken,
        outcome: Result<Recognition, String>,
    ) {
        match self.session.complete_recognition(token, outcome) {
            Completion::Stale => {
                self.metrics.record_stale();
                self.push_activity(format!(
                    "Discarded stale response {}",
                    token.generation()
                ));
            }
            Completion::Applied => match self.session.state() {
                SessionState::Annotated => {
                    self.current_frame = 0;
                    self.playback_secs = 0.0;
                    self.status = match self.session.result() {
                        Some(Recognition::Image(image)) => {
                            format!("Detected {} objects", image.boxes.len())
                        }
                        Some(Recognition::Video(video)) => format!(
                            "{} frames, average {:.2} objects per frame",
                            video.frame_count(),
                            video.average_boxes_per_frame()
                        ),
                        None => String::new(),
                    };
                    self.push_activity(self.status.clone());
                    self.render_current();
                }
                _ => {
                    self.metrics.record_failure();
                    self.status = format!(
                        "Recognition failed: {}",
                        self.session.error().unwrap_or("unknown error")
                    );
                }
            },
        }
    }

    fn seek(&mut self, index: usize) {
        let Some(Recognition::Video(video)) = self.session.result() else {
            return;
        };
        let Some(index) = clamp_frame_index(index, video.frame_count()) else {
            return;
        };
        self.playback_secs = index as f64 / video.fps;
        self.current_frame = index;
        self.render_current();
    }

    fn advance_playback(&mut self) {
        let Some(Recognition::Video(video)) = self.session.result() else {
            self.playing = false;
            return;
        };
        let step = advance(self.playback_secs, video.fps, video.frame_count());
        self.playback_secs = step.secs;
        if step.finished {
            self.playing = false;
        }
        if let Some(index) = step.frame {
            if index != self.current_frame || self.preview.is_none() {
                self.current_frame = index;
                self.render_current();
            }
        }
    }

    fn apply_style(&mut self) {
        if let Some(kind) = self.session.media_kind() {
            self.renderer.set_style(style_for(kind, self.placement));
        }
    }

    /// Repaints the frame last shown, e.g. after a style change.
    fn rerender(&mut self) {
        let Some(source) = self.source.as_deref() else {
            return;
        };
        let outcome = match self.session.result() {
            Some(Recognition::Video(video)) => self
                .renderer
                .rerender(source, video, &mut self.surface)
                .map(|shown| shown.is_some()),
            _ => Ok(false),
        };
        match outcome {
            Ok(true) => self.preview = Some(surface_handle(&self.surface)),
            Ok(false) => self.render_current(),
            Err(err) => self.show_render(Err(err)),
        }
    }

    fn render_current(&mut self) {
        let Some(source) = self.source.as_deref() else {
            self.preview = None;
            return;
        };
        let result = if self.session.is_renderable() {
            self.session.result()
        } else {
            None
        };
        let outcome: OverlayResult<()> = match result {
            Some(Recognition::Image(image)) => source
                .frame(0)
                .and_then(|media| self.renderer.render_image(&media, image, &mut self.surface)),
            Some(Recognition::Video(video)) if video.frame_count() > 0 => self
                .renderer
                .render_video_frame(source, video, self.current_frame, &mut self.surface),
            _ => source
                .frame(0)
                .and_then(|media| self.renderer.render_frame(&media, &[], &mut self.surface)),
        };
        self.show_render(outcome);
    }

    /// Publishes the surface, or drops the preview so a failed render never
    /// leaves an older frame on screen.
    fn show_render(&mut self, outcome: OverlayResult<()>) {
        match outcome {
            Ok(()) => self.preview = Some(surface_handle(&self.surface)),
            Err(err) => {
                self.preview = None;
                self.status = format!("Render error: {err}");
            }
        }
    }

    fn view_history(&mut self, id: i64) {
        let Some(entry) = self.history.iter().find(|entry| entry.id == id).cloned() else {
            self.status = format!("History record {id} is not loaded");
            return;
        };
        let recognition = match entry.recognition() {
            Ok(recognition) => recognition,
            Err(err) => {
                self.status = format!("Record {id} has an unreadable result: {err}");
                return;
            }
        };

        let stored = PathBuf::from(&entry.file_path);
        let source = if stored.is_file() {
            open_preview_source(entry.kind, &stored, self.form.frames_dir()).unwrap_or_else(|err| {
                warn!("record {} media unusable: {}", id, err);
                None
            })
        } else {
            None
        };

        self.session.load_media(entry.kind);
        let preview_note = if source.is_some() {
            ""
        } else {
            " (original media not on disk, no preview)"
        };
        self.install_media(entry.kind, stored, source);
        if let Ok(token) = self.session.begin_recognition() {
            self.session.complete_recognition(token, Ok(recognition));
        }
        self.status = format!("Record #{}: {}{}", entry.id, entry.summary(), preview_note);
        self.render_current();
    }

    fn push_activity(&mut self, entry: String) {
        self.activity.push(entry);
        if self.activity.len() > 20 {
            self.activity.remove(0);
        }
    }
}

fn style_for(kind: MediaKind, placement: ChipPlacement) -> OverlayStyle {
    let style = match kind {
        MediaKind::Image => OverlayStyle::image(),
        MediaKind::Video => OverlayStyle::video(),
    };
    style.with_placement(placement)
}

/// Images preview from the file itself; videos from extracted frames only.
fn open_preview_source(
    kind: MediaKind,
    path: &Path,
    frames_dir: Option<PathBuf>,
) -> OverlayResult<Option<Box<dyn FrameSource>>> {
    match kind {
        MediaKind::Image => Ok(Some(Box::new(StillImage::open(path)?))),
        MediaKind::Video => match frames_dir {
            Some(dir) => Ok(Some(Box::new(ImageSequence::open_dir(dir)?))),
            None => Ok(None),
        },
    }
}

fn surface_handle(surface: &RasterSurface) -> Handle {
    let image = surface.image();
    Handle::from_rgba(image.width(), image.height(), image.as_raw().clone())
}

fn frame_label(current: usize, frames: usize) -> String {
    format!("Frame {} / {}", current.min(frames.saturating_sub(1)) + 1, frames)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlaybackStep {
    secs: f64,
    frame: Option<usize>,
    finished: bool,
}

/// Moves playback forward one tick and maps the new time onto a sampled frame.
fn advance(playback_secs: f64, fps: f64, frame_count: usize) -> PlaybackStep {
    let secs = playback_secs + TICK.as_secs_f64();
    let raw = frame_index_for_time(secs, fps);
    PlaybackStep {
        secs,
        frame: clamp_frame_index(raw, frame_count),
        finished: raw >= frame_count.saturating_sub(1),
    }
}
