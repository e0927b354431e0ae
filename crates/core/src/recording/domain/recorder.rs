use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::recording::domain::clip_layout::ClipLayout;
use crate::recording::domain::recording_handle::{RecordingHandle, RecordingState};
use crate::shared::frame::Frame;
use crate::shared::session_config::SessionConfig;
use crate::shared::video_metadata::VideoMetadata;
use crate::tracking::domain::session::SessionId;
use crate::video::domain::video_writer::VideoWriter;

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("failed to open clip {path}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("failed to write clip {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("failed to close clip {path}: {message}")]
    Close { path: PathBuf, message: String },
    #[error("failed to move clip {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete clip {path}: {source}")]
    Discard {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a recording ended.
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// Long enough; moved into the label directory.
    Kept {
        path: PathBuf,
        label: String,
        duration: Duration,
    },
    /// Too short; deleted.
    Discarded { duration: Duration },
    /// Finalization failed; whatever was written stays in the temp area.
    LeftInPlace {
        path: PathBuf,
        error: RecordingError,
    },
}

/// Records one clip per face session.
///
/// A clip starts when a session mounts and ends when it dismounts. Clips
/// shorter than the minimum duration are deleted, the rest are moved into a
/// directory named after the session's final label.
pub struct Recorder {
    writer: Box<dyn VideoWriter>,
    layout: ClipLayout,
    fps: f64,
    min_clip: Duration,
    enabled: bool,
    active: Option<RecordingHandle>,
}

impl Recorder {
    pub fn new(
        writer: Box<dyn VideoWriter>,
        layout: ClipLayout,
        fps: f64,
        min_clip: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            writer,
            layout,
            fps,
            min_clip,
            enabled,
            active: None,
        }
    }

    pub fn from_config(writer: Box<dyn VideoWriter>, config: &SessionConfig) -> Self {
        Self::new(
            writer,
            ClipLayout::from_config(config),
            config.recording_fps,
            Duration::from_secs_f64(config.min_clip_secs),
            config.recording_enabled,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&RecordingHandle> {
        self.active.as_ref()
    }

    pub fn layout(&self) -> &ClipLayout {
        &self.layout
    }

    /// Starts a clip for a newly mounted session.
    ///
    /// No-op while disabled or when a clip is already active. Open failures
    /// are logged and leave the recorder idle for this session.
    pub fn on_mount(&mut self, session_id: SessionId, width: u32, height: u32) -> bool {
        if !self.enabled || self.active.is_some() {
            return false;
        }
        match self.start(session_id, width, height) {
            Ok(handle) => {
                log::info!("Recording session {} to {}", session_id.short(), handle.path().display());
                self.active = Some(handle);
                true
            }
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }

    fn start(
        &mut self,
        session_id: SessionId,
        width: u32,
        height: u32,
    ) -> Result<RecordingHandle, RecordingError> {
        let path = self.layout.temp_clip_path(session_id, Utc::now());
        let open_err = |message: String| RecordingError::Open {
            path: path.clone(),
            message,
        };

        fs::create_dir_all(self.layout.temp_dir()).map_err(|e| open_err(e.to_string()))?;
        let metadata = VideoMetadata::for_sink(width, height, self.fps);
        if let Err(e) = self.writer.open(&path, &metadata) {
            remove_if_exists(&path);
            return Err(open_err(e.to_string()));
        }

        let mut handle = RecordingHandle::new(session_id, path.clone(), Utc::now(), self.fps);
        handle.transition(RecordingState::Active);
        Ok(handle)
    }

    /// Appends a frame to the active clip.
    ///
    /// A write failure abandons the clip: the sink is closed and the partial
    /// file deleted. Recording resumes with the next session.
    pub fn feed_frame(&mut self, frame: &Frame) {
        let Some(handle) = self.active.as_mut() else {
            return;
        };
        match self.writer.write(frame) {
            Ok(()) => handle.record_frame(),
            Err(e) => {
                let error = RecordingError::Write {
                    path: handle.path().to_path_buf(),
                    message: e.to_string(),
                };
                log::warn!("{error}; abandoning recording");
                if let Err(e) = self.writer.close() {
                    log::debug!("Closing abandoned clip failed: {e}");
                }
                remove_if_exists(handle.path());
                handle.transition(RecordingState::Discarded);
                self.active = None;
            }
        }
    }

    /// Finalizes the clip of a dismounted session under `final_label`.
    ///
    /// Returns `None` when `session_id` doesn't own the active clip.
    pub fn on_dismount(&mut self, session_id: SessionId, final_label: &str) -> Option<FinalizeOutcome> {
        if self.active.as_ref()?.session_id() != session_id {
            return None;
        }
        self.finalize(final_label)
    }

    /// Toggles recording globally. Disabling finalizes any active clip under
    /// `current_label` with the usual duration rule; enabling takes effect
    /// at the next mount.
    pub fn set_enabled(&mut self, enabled: bool, current_label: &str) -> Option<FinalizeOutcome> {
        if self.enabled != enabled {
            log::info!("Recording {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        if enabled {
            None
        } else {
            self.finalize(current_label)
        }
    }

    fn finalize(&mut self, label: &str) -> Option<FinalizeOutcome> {
        let mut handle = self.active.take()?;
        handle.transition(RecordingState::Finalizing);
        let path = handle.path().to_path_buf();
        let duration = handle.duration();

        if let Err(e) = self.writer.close() {
            let error = RecordingError::Close {
                path: path.clone(),
                message: e.to_string(),
            };
            log::warn!("{error}; clip left in place");
            return Some(FinalizeOutcome::LeftInPlace { path, error });
        }

        if duration < self.min_clip {
            if let Err(source) = fs::remove_file(&path) {
                let error = RecordingError::Discard {
                    path: path.clone(),
                    source,
                };
                log::warn!("{error}");
                return Some(FinalizeOutcome::LeftInPlace { path, error });
            }
            handle.transition(RecordingState::Discarded);
            log::info!(
                "Discarded {:.1}s clip of session {}",
                duration.as_secs_f64(),
                handle.session_id().short()
            );
            return Some(FinalizeOutcome::Discarded { duration });
        }

        let label_dir = self.layout.label_dir(label);
        let Some(file_name) = path.file_name() else {
            // Temp clip paths always end in a file name.
            return Some(FinalizeOutcome::Discarded { duration });
        };
        let destination = label_dir.join(file_name);
        let relocated = fs::create_dir_all(&label_dir).and_then(|_| fs::rename(&path, &destination));
        if let Err(source) = relocated {
            let error = RecordingError::Relocate {
                from: path.clone(),
                to: destination,
                source,
            };
            log::warn!("{error}; clip left in place");
            return Some(FinalizeOutcome::LeftInPlace { path, error });
        }

        handle.transition(RecordingState::Kept);
        log::info!(
            "Kept {:.1}s clip as {}",
            duration.as_secs_f64(),
            destination.display()
        );
        Some(FinalizeOutcome::Kept {
            path: destination,
            label: label.to_string(),
            duration,
        })
    }
}

fn remove_if_exists(path: &std::path::Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to delete {}: {e}", path.display());
        }
    }
}
