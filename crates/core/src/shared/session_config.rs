use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value}")]
    NonPositiveWindow { name: &'static str, value: f64 },
    #[error("max_center_shift_px must be positive, got {0}")]
    NonPositiveShift(i32),
    #[error("acceptance_threshold must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("recording_fps must be positive, got {0}")]
    NonPositiveFps(f64),
    #[error("bbox_scale must be positive, got {0}")]
    NonPositiveScale(f64),
    #[error("temp_dir_name must be a single non-empty path component, got '{0}'")]
    InvalidTempDirName(String),
}

/// Policy knobs for session tracking, voting, recording and capture.
///
/// Serialized as part of the CLI settings file; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Detections further apart than this end the session.
    pub grace_window_secs: f64,
    /// Centroid movement (per axis) at or above this starts a new session.
    pub max_center_shift_px: i32,
    /// Minimum spacing between recognition calls for one session.
    pub poll_interval_secs: f64,
    /// Normalized confidence (0-100) a prediction must exceed to count.
    pub acceptance_threshold: f64,
    /// Clips shorter than this are discarded at dismount.
    pub min_clip_secs: f64,
    pub recording_fps: f64,
    /// Scale applied to the square face crop around each detection.
    pub bbox_scale: f64,
    pub output_dir: PathBuf,
    pub temp_dir_name: String,
    pub faces_dir: PathBuf,
    pub capture_interval_secs: f64,
    pub recording_enabled: bool,
    pub recognition_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: 1.0,
            max_center_shift_px: 50,
            poll_interval_secs: 1.0,
            acceptance_threshold: 50.0,
            min_clip_secs: 5.0,
            recording_fps: 30.0,
            bbox_scale: 1.2,
            output_dir: PathBuf::from("interactions"),
            temp_dir_name: "temp".to_string(),
            faces_dir: PathBuf::from("faces"),
            capture_interval_secs: 0.2,
            recording_enabled: true,
            recognition_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("grace_window_secs", self.grace_window_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("min_clip_secs", self.min_clip_secs),
            ("capture_interval_secs", self.capture_interval_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveWindow { name, value });
            }
        }
        if self.max_center_shift_px <= 0 {
            return Err(ConfigError::NonPositiveShift(self.max_center_shift_px));
        }
        if !(0.0..=100.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.acceptance_threshold));
        }
        if !(self.recording_fps.is_finite() && self.recording_fps > 0.0) {
            return Err(ConfigError::NonPositiveFps(self.recording_fps));
        }
        if !(self.bbox_scale.is_finite() && self.bbox_scale > 0.0) {
            return Err(ConfigError::NonPositiveScale(self.bbox_scale));
        }
        let name = self.temp_dir_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidTempDirName(self.temp_dir_name.clone()));
        }
        Ok(())
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs_f64(self.grace_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f64(self.capture_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_session_policy() {
        let config = SessionConfig::default();
        assert_relative_eq!(config.grace_window_secs, 1.0);
        assert_eq!(config.max_center_shift_px, 50);
        assert_relative_eq!(config.poll_interval_secs, 1.0);
        assert_relative_eq!(config.acceptance_threshold, 50.0);
        assert_relative_eq!(config.min_clip_secs, 5.0);
        assert_relative_eq!(config.recording_fps, 30.0);
        assert_relative_eq!(config.bbox_scale, 1.2);
        assert_eq!(config.output_dir, PathBuf::from("interactions"));
        assert_eq!(config.temp_dir_name, "temp");
        assert!(config.recording_enabled);
        assert!(config.recognition_enabled);
    }

    #[test]
    fn test_defaults_validate() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_duration_helpers() {
        let config = SessionConfig::default();
        assert_eq!(config.grace_window(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.capture_interval(), Duration::from_millis(200));
    }

    #[rstest]
    #[case::zero_grace(SessionConfig { grace_window_secs: 0.0, ..Default::default() })]
    #[case::negative_poll(SessionConfig { poll_interval_secs: -1.0, ..Default::default() })]
    #[case::nan_clip(SessionConfig { min_clip_secs: f64::NAN, ..Default::default() })]
    #[case::zero_shift(SessionConfig { max_center_shift_px: 0, ..Default::default() })]
    #[case::threshold_high(SessionConfig { acceptance_threshold: 101.0, ..Default::default() })]
    #[case::zero_fps(SessionConfig { recording_fps: 0.0, ..Default::default() })]
    #[case::zero_scale(SessionConfig { bbox_scale: 0.0, ..Default::default() })]
    #[case::nested_temp(SessionConfig { temp_dir_name: "a/b".into(), ..Default::default() })]
    #[case::parent_temp(SessionConfig { temp_dir_name: "..".into(), ..Default::default() })]
    fn test_invalid_configs_rejected(#[case] config: SessionConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "min_clip_secs": 8.0, "faces_dir": "people" }"#).unwrap();
        assert_relative_eq!(config.min_clip_secs, 8.0);
        assert_eq!(config.faces_dir, PathBuf::from("people"));
        assert_eq!(config.max_center_shift_px, 50);
    }

    #[test]
    fn test_error_message_names_field() {
        let config = SessionConfig {
            poll_interval_secs: 0.0,
            ..Default::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("poll_interval_secs"));
    }
}
