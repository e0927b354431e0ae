use crate::shared::frame::Frame;

/// Maps a face crop to an L2-normalized embedding vector.
pub trait FaceEmbedder: Send {
    fn embed(&mut self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
