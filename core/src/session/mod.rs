//! Recognition session state machine with stale-response protection.
//!
//! Every request is tagged with a [`RequestToken`] drawn from a generation
//! counter that also advances on each media load. A response is applied only
//! when its token is the latest one issued, so a slow answer for media the
//! user already replaced can never overwrite newer state.

use crate::detection::{MediaKind, Recognition};
use crate::prelude::{OverlayError, OverlayResult};
use crate::telemetry::LogManager;

/// Generation number identifying one recognition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loaded,
    Recognizing,
    Annotated,
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Empty => "empty",
            SessionState::Loaded => "loaded",
            SessionState::Recognizing => "recognizing",
            SessionState::Annotated => "annotated",
            SessionState::Failed => "failed",
        }
    }
}

/// What happened to a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

pub struct Session {
    state: SessionState,
    generation: u64,
    pending: Option<RequestToken>,
    media_kind: Option<MediaKind>,
    result: Option<Recognition>,
    error: Option<String>,
    logger: LogManager,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            generation: 0,
            pending: None,
            media_kind: None,
            result: None,
            error: None,
            logger: LogManager::scoped("session"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media_kind
    }

    pub fn result(&self) -> Option<&Recognition> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True only once a result is present and no request is in flight.
    pub fn is_renderable(&self) -> bool {
        self.state == SessionState::Annotated && self.result.is_some()
    }

    /// New media replaces everything; any request still in flight goes stale.
    pub fn load_media(&mut self, kind: MediaKind) {
        self.generation += 1;
        self.state = SessionState::Loaded;
        self.media_kind = Some(kind);
        self.pending = None;
        self.result = None;
        self.error = None;
        self.logger
            .record(&format!("{} media loaded (generation {})", kind.as_str(), self.generation));
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.state = SessionState::Empty;
        self.media_kind = None;
        self.pending = None;
        self.result = None;
        self.error = None;
    }

    pub fn begin_recognition(&mut self) -> OverlayResult<RequestToken> {
        match self.state {
            SessionState::Loaded | SessionState::Annotated | SessionState::Failed => {}
            state => {
                return Err(OverlayError::InvalidTransition {
                    action: "start recognition",
                    state: state.name(),
                })
            }
        }
        self.generation += 1;
        let token = RequestToken(self.generation);
        self.pending = Some(token);
        self.state = SessionState::Recognizing;
        self.result = None;
        self.error = None;
        self.logger
            .detail(&format!("recognition request {} issued", token.generation()));
        Ok(token)
    }

    /// Applies a response if `token` is still the latest request.
    pub fn complete_recognition(
        &mut self,
        token: RequestToken,
        outcome: Result<Recognition, String>,
    ) -> Completion {
        if self.state != SessionState::Recognizing || self.pending != Some(token) {
            self.logger.record(&format!(
                "discarding stale response {} (current generation {})",
                token.generation(),
                self.generation
            ));
            return Completion::Stale;
        }
        self.pending = None;

        let outcome = outcome.and_then(|recognition| match self.media_kind {
            Some(kind) if kind != recognition.kind() => Err(format!(
                "expected a {} result, got {}",
                kind.as_str(),
                recognition.kind().as_str()
            )),
            _ => Ok(recognition),
        });

        match outcome {
            Ok(recognition) => {
                self.result = Some(recognition);
                self.state = SessionState::Annotated;
            }
            Err(message) => {
                self.logger.record(&format!("recognition failed: {}", message));
                self.error = Some(message);
                self.state = SessionState::Failed;
            }
        }
        Completion::Applied
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectedBox, ImageRecognition};

    fn image_result(label: &str) -> Recognition {
        Recognition::Image(ImageRecognition {
            boxes: vec![DetectedBox::new(1.0, 1.0, 2.0, 2.0, label, 0.5)],
            ..Default::default()
        })
    }

    fn label_of(session: &Session) -> Option<String> {
        match session.result() {
            Some(Recognition::Image(image)) => Some(image.boxes[0].label.clone()),
            _ => None,
        }
    }

    #[test]
    fn happy_path_reaches_annotated() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Empty);
        session.load_media(MediaKind::Image);
        assert_eq!(session.state(), SessionState::Loaded);
        let token = session.begin_recognition().unwrap();
        assert_eq!(session.state(), SessionState::Recognizing);
        assert!(!session.is_renderable());
        assert_eq!(
            session.complete_recognition(token, Ok(image_result("cat"))),
            Completion::Applied
        );
        assert_eq!(session.state(), SessionState::Annotated);
        assert!(session.is_renderable());
    }

    #[test]
    fn recognition_needs_media() {
        let mut session = Session::new();
        assert!(matches!(
            session.begin_recognition(),
            Err(OverlayError::InvalidTransition { state: "empty", .. })
        ));
    }

    #[test]
    fn no_second_request_while_one_is_in_flight() {
        let mut session = Session::new();
        session.load_media(MediaKind::Image);
        session.begin_recognition().unwrap();
        assert!(session.begin_recognition().is_err());
    }

    #[test]
    fn failure_is_recoverable() {
        let mut session = Session::new();
        session.load_media(MediaKind::Video);
        let token = session.begin_recognition().unwrap();
        session.complete_recognition(token, Err("timeout".into()));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.error(), Some("timeout"));
        assert!(!session.is_renderable());
        assert!(session.begin_recognition().is_ok());
        assert!(session.error().is_none());
    }

    #[test]
    fn response_for_replaced_media_is_discarded() {
        let mut session = Session::new();
        session.load_media(MediaKind::Image);
        let old = session.begin_recognition().unwrap();
        session.load_media(MediaKind::Image);
        let new = session.begin_recognition().unwrap();
        assert!(new > old);

        assert_eq!(
            session.complete_recognition(old, Ok(image_result("stale"))),
            Completion::Stale
        );
        assert_eq!(session.state(), SessionState::Recognizing);
        session.complete_recognition(new, Ok(image_result("fresh")));
        assert_eq!(label_of(&session).as_deref(), Some("fresh"));

        assert_eq!(
            session.complete_recognition(old, Ok(image_result("stale"))),
            Completion::Stale
        );
        assert_eq!(label_of(&session).as_deref(), Some("fresh"));
    }

    #[test]
    fn response_after_upload_without_new_request_is_discarded() {
        let mut session = Session::new();
        session.load_media(MediaKind::Image);
        let token = session.begin_recognition().unwrap();
        session.load_media(MediaKind::Image);
        assert_eq!(
            session.complete_recognition(token, Ok(image_result("late"))),
            Completion::Stale
        );
        assert_eq!(session.state(), SessionState::Loaded);
        assert!(session.result().is_none());
    }

    #[test]
    fn mismatched_kind_fails_the_request() {
        let mut session = Session::new();
        session.load_media(MediaKind::Video);
        let token = session.begin_recognition().unwrap();
        session.complete_recognition(token, Ok(image_result("cat")));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn new_media_drops_previous_result() {
        let mut session = Session::new();
        session.load_media(MediaKind::Image);
        let token = session.begin_recognition().unwrap();
        session.complete_recognition(token, Ok(image_result("cat")));
        assert!(session.is_renderable());
        session.load_media(MediaKind::Video);
        assert!(session.result().is_none());
        assert_eq!(session.media_kind(), Some(MediaKind::Video));
        session.clear();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.media_kind().is_none());
    }
}
