use std::time::Duration;

use crate::shared::face_box::FaceBox;
use crate::tracking::domain::session::{SessionEvent, SessionId};

/// Operator commands, applied between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    SetRecording(bool),
    ToggleRecording,
    SetRecognition(bool),
    ToggleRecognition,
    ToggleCapture,
    NextPerson,
    PreviousPerson,
    /// Rebuild the recognizer's gallery from the faces directory.
    ReloadGallery,
    Quit,
}

impl ControlCommand {
    /// Maps the single-key shortcuts of the interactive console.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'r' => Some(ControlCommand::ToggleRecording),
            'f' => Some(ControlCommand::ToggleRecognition),
            's' => Some(ControlCommand::ToggleCapture),
            'd' => Some(ControlCommand::NextPerson),
            'a' => Some(ControlCommand::PreviousPerson),
            't' => Some(ControlCommand::ReloadGallery),
            'q' => Some(ControlCommand::Quit),
            _ => None,
        }
    }
}

/// Per-frame state handed to the rendering side.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_index: usize,
    pub timestamp: Duration,
    pub session_id: Option<SessionId>,
    /// Square face box around this frame's detection, if there was one.
    pub bounding_box: Option<FaceBox>,
    /// Majority label of the active session.
    pub label: Option<String>,
    pub recording_enabled: bool,
    pub recognition_enabled: bool,
    pub capture_enabled: bool,
    pub person_index: i32,
    pub is_recording: bool,
    pub events: Vec<SessionEvent>,
}

/// Receives one report per processed frame.
pub trait FrameObserver {
    fn on_frame(&mut self, report: &FrameReport);
}

/// Observer that ignores every report.
pub struct NullFrameObserver;

impl FrameObserver for NullFrameObserver {
    fn on_frame(&mut self, _report: &FrameReport) {}
}
