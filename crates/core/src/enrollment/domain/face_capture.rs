use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::shared::frame::Frame;
use crate::shared::session_config::SessionConfig;
use crate::video::domain::image_writer::ImageWriter;

/// Saves face crops for building the recognition gallery.
///
/// While enabled, crops are written to `<faces_dir>/person_<index>/` at most
/// once per capture interval. The person index is moved by the operator;
/// renaming the folder to the person's name is left to them.
pub struct FaceCapture {
    writer: Box<dyn ImageWriter>,
    faces_dir: PathBuf,
    interval: Duration,
    enabled: bool,
    person_index: i32,
    last_capture_at: Option<Duration>,
    saved: usize,
}

impl FaceCapture {
    pub fn new(writer: Box<dyn ImageWriter>, faces_dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            writer,
            faces_dir: faces_dir.into(),
            interval,
            enabled: false,
            person_index: 0,
            last_capture_at: None,
            saved: 0,
        }
    }

    pub fn from_config(writer: Box<dyn ImageWriter>, config: &SessionConfig) -> Self {
        Self::new(writer, &config.faces_dir, config.capture_interval())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn person_index(&self) -> i32 {
        self.person_index
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn faces_dir(&self) -> &Path {
        &self.faces_dir
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        log::info!(
            "Face capture {} (person_{})",
            if self.enabled { "enabled" } else { "disabled" },
            self.person_index
        );
        self.enabled
    }

    pub fn next_person(&mut self) -> i32 {
        self.person_index += 1;
        log::info!("Capturing as person_{}", self.person_index);
        self.person_index
    }

    pub fn previous_person(&mut self) -> i32 {
        self.person_index -= 1;
        log::info!("Capturing as person_{}", self.person_index);
        self.person_index
    }

    pub fn person_dir(&self) -> PathBuf {
        self.faces_dir.join(format!("person_{}", self.person_index))
    }

    /// `<unix_millis>.jpg`, suffixed when a file-clock run outpaces the wall
    /// clock and the name is taken.
    fn next_capture_path(&self) -> PathBuf {
        let dir = self.person_dir();
        let stamp = Utc::now().timestamp_millis();
        let mut path = dir.join(format!("{stamp}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}_{n}.jpg"));
            n += 1;
        }
        path
    }

    /// Saves `face_crop` if capture is on and the interval has passed.
    ///
    /// Returns the written path. Write failures are logged and reported as
    /// no capture.
    pub fn maybe_capture(&mut self, face_crop: &Frame, now: Duration) -> Option<PathBuf> {
        if !self.enabled || face_crop.is_empty() {
            return None;
        }
        if let Some(last) = self.last_capture_at {
            if now.saturating_sub(last) < self.interval {
                return None;
            }
        }
        self.last_capture_at = Some(now);

        let path = self.next_capture_path();
        match self.writer.write(&path, face_crop) {
            Ok(()) => {
                self.saved += 1;
                log::debug!("Captured {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("Failed to save face capture {}: {e}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct MemoryWriter {
        paths: Arc<Mutex<Vec<PathBuf>>>,
        fail: bool,
    }

    impl ImageWriter for MemoryWriter {
        fn write(&self, path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail {
                return Err("read-only filesystem".into());
            }
            self.paths.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn capture(fail: bool) -> (FaceCapture, Arc<Mutex<Vec<PathBuf>>>) {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let writer = MemoryWriter {
            paths: Arc::clone(&paths),
            fail,
        };
        let capture = FaceCapture::new(Box::new(writer), "faces", Duration::from_millis(200));
        (capture, paths)
    }

    fn crop() -> Frame {
        Frame::new(vec![9; 6 * 6 * 3], 6, 6, 3, 0)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_disabled_by_default() {
        let (mut capture, paths) = capture(false);
        assert!(!capture.is_enabled());
        assert!(capture.maybe_capture(&crop(), ms(0)).is_none());
        assert!(paths.lock().unwrap().is_empty());
    }

    #[test]
    fn test_captures_are_rate_limited() {
        let (mut capture, paths) = capture(false);
        capture.toggle();
        let crop = crop();

        for t in (0..=1000).step_by(50) {
            capture.maybe_capture(&crop, ms(t));
        }
        // 0, 200, 400, 600, 800, 1000
        assert_eq!(paths.lock().unwrap().len(), 6);
        assert_eq!(capture.saved(), 6);
    }

    #[test]
    fn test_person_index_selects_directory() {
        let (mut capture, paths) = capture(false);
        capture.toggle();
        capture.next_person();
        capture.next_person();
        capture.maybe_capture(&crop(), ms(0));
        capture.previous_person();
        capture.previous_person();
        capture.previous_person();
        capture.maybe_capture(&crop(), ms(500));

        let paths = paths.lock().unwrap();
        assert!(paths[0].starts_with("faces/person_2"));
        assert!(paths[1].starts_with("faces/person_-1"));
        assert_eq!(paths[0].extension().unwrap(), "jpg");
    }

    #[test]
    fn test_empty_crop_is_skipped() {
        let (mut capture, paths) = capture(false);
        capture.toggle();
        let empty = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(capture.maybe_capture(&empty, ms(0)).is_none());
        assert!(paths.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_failure_is_absorbed() {
        let (mut capture, _) = capture(true);
        capture.toggle();
        assert!(capture.maybe_capture(&crop(), ms(0)).is_none());
        assert_eq!(capture.saved(), 0);
    }

    #[test]
    fn test_writes_real_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = crate::video::infrastructure::image_file_writer::ImageFileWriter::new();
        let mut capture = FaceCapture::new(Box::new(writer), tmp.path(), ms(200));
        capture.toggle();
        let path = capture.maybe_capture(&crop(), ms(0)).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(tmp.path().join("person_0")));

        // Stream time can run ahead of the wall clock; names must not clash.
        let second = capture.maybe_capture(&crop(), ms(300)).unwrap();
        let third = capture.maybe_capture(&crop(), ms(600)).unwrap();
        assert_ne!(path, second);
        assert_ne!(second, third);
        assert_eq!(std::fs::read_dir(tmp.path().join("person_0")).unwrap().count(), 3);
    }
}
