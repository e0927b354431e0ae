use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::shared::constants::{CLIP_EXTENSION, UNKNOWN_LABEL};
use crate::shared::session_config::SessionConfig;
use crate::tracking::domain::session::SessionId;

/// Where clips live on disk.
///
/// ```text
/// <root>/temp/<unix_secs>_<short_id>.mov   while recording
/// <root>/<label>/<unix_secs>_<short_id>.mov  once kept
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ClipLayout {
    root: PathBuf,
    temp_dir: PathBuf,
}

impl ClipLayout {
    pub fn new(root: impl Into<PathBuf>, temp_dir_name: &str) -> Self {
        let root = root.into();
        let temp_dir = root.join(temp_dir_name);
        Self { root, temp_dir }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.output_dir, &config.temp_dir_name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn temp_clip_path(&self, session_id: SessionId, started_at: DateTime<Utc>) -> PathBuf {
        self.temp_dir.join(format!(
            "{}_{}.{CLIP_EXTENSION}",
            started_at.timestamp(),
            session_id.short()
        ))
    }

    /// Directory for clips kept under `label`. A label naming the staging
    /// directory gets a trailing `_` so kept clips never land back in it.
    pub fn label_dir(&self, label: &str) -> PathBuf {
        let mut name = sanitize_label(label);
        let staging = self.temp_dir.file_name().and_then(|n| n.to_str());
        if staging.is_some_and(|t| t.eq_ignore_ascii_case(&name)) {
            name.push('_');
        }
        self.root.join(name)
    }
}

/// Makes a label safe to use as a single directory name.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        cleaned
    }
}
