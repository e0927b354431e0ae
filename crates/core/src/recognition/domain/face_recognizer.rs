use crate::shared::frame::Frame;

/// One recognition answer for a face crop.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Model-specific score, accumulated per label for reporting.
    pub raw_confidence: f64,
    /// Confidence on a 0-100 scale; compared against the acceptance threshold.
    pub normalized_confidence: f64,
}

/// Domain interface for identifying the person in a face crop.
///
/// Implementations may hold model state, hence `&mut self`.
pub trait FaceRecognizer: Send {
    fn predict(&mut self, face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>>;

    /// Rebuilds the set of known identities from their source.
    ///
    /// Returns how many identities are now known.
    fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
        Err("this recognizer does not support reloading".into())
    }
}
