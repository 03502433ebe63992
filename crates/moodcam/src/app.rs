//! Controller state and its event-driven transitions.
//!
//! All fields are mutated only through [`App::handle`], one event at a time.
//! Side effects are returned to the caller instead of being performed here.

use crate::engine::StreamInfo;
use moodcam_core::EmotionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoadState {
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSurface {
    Unbound,
    Bound(StreamInfo),
}

/// Things that happen to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Both model artifacts finished loading.
    ModelsLoaded,
    /// The camera stream was bound to the video surface.
    CameraBound(StreamInfo),
    /// The user asked for a capture.
    CaptureRequested,
    /// A capture finished. `None` when the engine skipped it (no video).
    CaptureFinished(Option<EmotionResult>),
    /// A capture failed or timed out.
    CaptureFailed,
}

/// Work the runtime must start on the controller's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    AcquireCamera,
    RunCapture,
}

#[derive(Debug)]
pub struct App {
    load_state: ModelLoadState,
    video: VideoSurface,
    result: Option<EmotionResult>,
    capture_in_flight: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            load_state: ModelLoadState::Loading,
            video: VideoSurface::Unbound,
            result: None,
            capture_in_flight: false,
        }
    }

    pub fn load_state(&self) -> ModelLoadState {
        self.load_state
    }

    pub fn video(&self) -> &VideoSurface {
        &self.video
    }

    pub fn result(&self) -> Option<&EmotionResult> {
        self.result.as_ref()
    }

    pub fn capture_in_flight(&self) -> bool {
        self.capture_in_flight
    }

    /// Apply one event and return the effect it triggers, if any.
    pub fn handle(&mut self, event: Event) -> Option<Effect> {
        match event {
            Event::ModelsLoaded => match self.load_state {
                ModelLoadState::Loading => {
                    tracing::info!("models ready");
                    self.load_state = ModelLoadState::Ready;
                    Some(Effect::AcquireCamera)
                }
                ModelLoadState::Ready => {
                    tracing::warn!("models reported loaded twice, ignoring");
                    None
                }
            },
            Event::CameraBound(info) => {
                tracing::info!(device = %info.device, width = info.width, height = info.height, "video surface bound");
                self.video = VideoSurface::Bound(info);
                None
            }
            Event::CaptureRequested => {
                if self.load_state == ModelLoadState::Loading {
                    tracing::debug!("capture requested while loading, ignoring");
                    None
                } else if self.capture_in_flight {
                    tracing::debug!("capture already in flight, ignoring");
                    None
                } else {
                    self.capture_in_flight = true;
                    Some(Effect::RunCapture)
                }
            }
            Event::CaptureFinished(result) => {
                self.capture_in_flight = false;
                if let Some(result) = result {
                    self.result = Some(result);
                }
                None
            }
            Event::CaptureFailed => {
                self.capture_in_flight = false;
                None
            }
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodcam_core::Expression;

    fn stream() -> StreamInfo {
        StreamInfo {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
        }
    }

    fn detected(expression: Expression, confidence: f32) -> EmotionResult {
        EmotionResult::Detected {
            expression,
            confidence,
        }
    }

    fn ready_app() -> App {
        let mut app = App::new();
        app.handle(Event::ModelsLoaded);
        app.handle(Event::CameraBound(stream()));
        app
    }

    #[test]
    fn test_starts_loading_without_result() {
        let app = App::new();
        assert_eq!(app.load_state(), ModelLoadState::Loading);
        assert_eq!(app.video(), &VideoSurface::Unbound);
        assert!(app.result().is_none());
    }

    #[test]
    fn test_models_loaded_transitions_once() {
        let mut app = App::new();
        assert_eq!(app.handle(Event::ModelsLoaded), Some(Effect::AcquireCamera));
        assert_eq!(app.load_state(), ModelLoadState::Ready);

        // A second report neither reverts the state nor re-acquires the camera.
        assert_eq!(app.handle(Event::ModelsLoaded), None);
        assert_eq!(app.load_state(), ModelLoadState::Ready);

        for event in [
            Event::CaptureRequested,
            Event::CaptureFinished(Some(EmotionResult::NoFace)),
            Event::CaptureFailed,
        ] {
            app.handle(event);
            assert_eq!(app.load_state(), ModelLoadState::Ready);
        }
    }

    #[test]
    fn test_capture_unreachable_while_loading() {
        let mut app = App::new();
        for _ in 0..3 {
            assert_eq!(app.handle(Event::CaptureRequested), None);
        }
        assert!(!app.capture_in_flight());
        assert!(app.result().is_none());
    }

    #[test]
    fn test_capture_reachable_when_ready() {
        let mut app = ready_app();
        assert_eq!(app.handle(Event::CaptureRequested), Some(Effect::RunCapture));
        assert!(app.capture_in_flight());
    }

    #[test]
    fn test_repeat_request_while_in_flight_is_ignored() {
        let mut app = ready_app();
        assert_eq!(app.handle(Event::CaptureRequested), Some(Effect::RunCapture));
        assert_eq!(app.handle(Event::CaptureRequested), None);

        app.handle(Event::CaptureFinished(Some(EmotionResult::NoFace)));
        assert_eq!(app.handle(Event::CaptureRequested), Some(Effect::RunCapture));
    }

    #[test]
    fn test_results_overwrite() {
        let mut app = ready_app();

        let sequence = [
            detected(Expression::Happy, 81.0),
            EmotionResult::NoFace,
            detected(Expression::Sad, 55.5),
            detected(Expression::Sad, 60.25),
        ];
        for result in sequence {
            app.handle(Event::CaptureRequested);
            app.handle(Event::CaptureFinished(Some(result.clone())));
            assert_eq!(app.result(), Some(&result));
        }
    }

    #[test]
    fn test_failed_capture_keeps_previous_result() {
        let mut app = ready_app();
        app.handle(Event::CaptureRequested);
        app.handle(Event::CaptureFinished(Some(detected(Expression::Angry, 70.0))));

        app.handle(Event::CaptureRequested);
        app.handle(Event::CaptureFailed);
        assert!(!app.capture_in_flight());
        assert_eq!(app.result(), Some(&detected(Expression::Angry, 70.0)));
    }

    #[test]
    fn test_skipped_capture_sets_no_result() {
        let mut app = App::new();
        app.handle(Event::ModelsLoaded);
        app.handle(Event::CaptureRequested);
        app.handle(Event::CaptureFinished(None));
        assert!(app.result().is_none());
        assert!(!app.capture_in_flight());
    }
}
