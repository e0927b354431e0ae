use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::tracking::domain::session::SessionId;

/// Lifecycle of one clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Active,
    Finalizing,
    Kept,
    Discarded,
}

/// The clip being recorded for the active session.
#[derive(Clone, Debug)]
pub struct RecordingHandle {
    session_id: SessionId,
    path: PathBuf,
    started_at: DateTime<Utc>,
    frame_count: usize,
    fps: f64,
    state: RecordingState,
}

impl RecordingHandle {
    pub fn new(session_id: SessionId, path: PathBuf, started_at: DateTime<Utc>, fps: f64) -> Self {
        Self {
            session_id,
            path,
            started_at,
            frame_count: 0,
            fps,
            state: RecordingState::Idle,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Playback length of the frames written so far.
    pub fn duration(&self) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(self.frame_count as f64 / self.fps)
        } else {
            Duration::ZERO
        }
    }

    pub fn record_frame(&mut self) {
        self.frame_count += 1;
    }

    pub fn transition(&mut self, next: RecordingState) {
        log::debug!(
            "Recording {}: {:?} -> {:?}",
            self.session_id.short(),
            self.state,
            next
        );
        self.state = next;
    }
}
