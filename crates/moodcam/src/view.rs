//! Terminal rendering of the controller state.

use crate::app::{App, ModelLoadState, VideoSurface};
use moodcam_core::EmotionResult;

pub const HEADING: &str = "AI Emotion Detection";
pub const LOADING_MESSAGE: &str = "Loading models...";
pub const CAPTURE_CONTROL: &str = "[Enter] Capture & Detect Emotion   [q] Quit";
pub const CAPTURE_BUSY: &str = "Detecting...";

/// Fixed display box of the video surface.
pub const DISPLAY_WIDTH: u32 = 480;
pub const DISPLAY_HEIGHT: u32 = 360;

/// Render the full view as newline-separated text.
pub fn render(app: &App) -> String {
    let mut lines = vec![HEADING.to_string()];

    match app.load_state() {
        ModelLoadState::Loading => lines.push(LOADING_MESSAGE.to_string()),
        ModelLoadState::Ready => {
            lines.push(video_line(app.video()));
            lines.push(if app.capture_in_flight() {
                CAPTURE_BUSY.to_string()
            } else {
                CAPTURE_CONTROL.to_string()
            });
            if let Some(result) = app.result() {
                lines.extend(result_lines(result));
            }
        }
    }

    lines.join("\n")
}

fn video_line(video: &VideoSurface) -> String {
    match video {
        VideoSurface::Unbound => format!("[video {DISPLAY_WIDTH}x{DISPLAY_HEIGHT}: no stream]"),
        VideoSurface::Bound(info) => format!(
            "[video {DISPLAY_WIDTH}x{DISPLAY_HEIGHT}: {} streaming at {}x{}]",
            info.device, info.width, info.height
        ),
    }
}

/// `Emotion: <label>`, plus `Confidence: <xx.xx>%` only when confidence > 0.
pub fn result_lines(result: &EmotionResult) -> Vec<String> {
    let mut lines = vec![format!("Emotion: {}", result.label())];
    if result.has_confidence() {
        lines.push(format!("Confidence: {}%", result.confidence_text()));
    }
    lines
}
