use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use facesession_core::detection::infrastructure::onnx_yolo_detector::DEFAULT_CONFIDENCE;
use facesession_core::shared::constants::APP_DIR_NAME;
use facesession_core::shared::session_config::SessionConfig;

/// Persisted CLI defaults. Command-line flags override these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub confidence: f64,
    pub skip_frames: usize,
    /// 0 runs the recognizer inline without a timeout.
    pub recognition_timeout_ms: u64,
    pub threaded_writer: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            confidence: DEFAULT_CONFIDENCE,
            skip_frames: 1,
            recognition_timeout_ms: 2000,
            threaded_writer: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Loads from `path`, or the per-user settings file when `None`.
    /// A missing or unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_path(),
        };
        let Some(path) = path else {
            return Self::default();
        };
        let Ok(json) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring invalid settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }
}
