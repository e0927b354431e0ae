use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Returns the single largest face in the frame, if any. Implementations
/// may be stateful (e.g., skipping frames), hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>>;
}
