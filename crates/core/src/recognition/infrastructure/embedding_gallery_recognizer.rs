use std::path::{Path, PathBuf};

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_recognizer::{FaceRecognizer, Prediction};
use crate::recognition::infrastructure::face_gallery::FaceGallery;
use crate::shared::frame::Frame;

/// Similarity at which the normalized confidence crosses 50.
pub const SIMILARITY_MIDPOINT: f64 = 0.4;
const SIMILARITY_STEEPNESS: f64 = 20.0;

/// Nearest-centroid recognizer over an enrolled embedding gallery.
///
/// Predicts the gallery label closest to the crop's embedding. An empty
/// gallery makes every prediction fail.
pub struct EmbeddingGalleryRecognizer {
    embedder: Box<dyn FaceEmbedder>,
    faces_dir: PathBuf,
    gallery: FaceGallery,
}

impl EmbeddingGalleryRecognizer {
    /// Builds the gallery from `faces_dir`. A missing or empty directory
    /// leaves the gallery empty and is logged, so enrollment can fill it
    /// later.
    pub fn new(mut embedder: Box<dyn FaceEmbedder>, faces_dir: &Path) -> Self {
        let gallery = match FaceGallery::load(faces_dir, embedder.as_mut()) {
            Ok(gallery) => {
                log::info!("Loaded {} known identities from {}", gallery.len(), faces_dir.display());
                gallery
            }
            Err(e) => {
                log::warn!("No face gallery available: {e}");
                FaceGallery::default()
            }
        };
        Self {
            embedder,
            faces_dir: faces_dir.to_path_buf(),
            gallery,
        }
    }

    pub fn known_identities(&self) -> usize {
        self.gallery.len()
    }
}

impl FaceRecognizer for EmbeddingGalleryRecognizer {
    fn predict(&mut self, face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
        if self.gallery.is_empty() {
            return Err("face gallery is empty".into());
        }
        let embedding = self.embedder.embed(face)?;
        let (label, similarity) = self
            .gallery
            .best_match(&embedding)
            .ok_or("face gallery is empty")?;
        Ok(Prediction {
            label: label.to_string(),
            raw_confidence: similarity,
            normalized_confidence: normalize_similarity(similarity),
        })
    }

    fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
        let gallery = FaceGallery::load(&self.faces_dir, self.embedder.as_mut())?;
        self.gallery = gallery;
        Ok(self.gallery.len())
    }
}

/// Logistic map from cosine similarity to a 0-100 confidence.
pub fn normalize_similarity(similarity: f64) -> f64 {
    100.0 / (1.0 + (-(similarity - SIMILARITY_MIDPOINT) * SIMILARITY_STEEPNESS).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::infrastructure::face_gallery::tests::{
        solid_frame, write_sample, MeanColorEmbedder,
    };
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(0.4, 50.0)]
    #[case(1.0, 99.999)]
    #[case(-1.0, 0.0)]
    fn test_normalize_similarity(#[case] sim: f64, #[case] expected: f64) {
        assert_relative_eq!(normalize_similarity(sim), expected, epsilon = 1e-2);
    }

    #[test]
    fn test_normalize_similarity_is_monotonic() {
        assert!(normalize_similarity(0.45) > normalize_similarity(0.35));
    }

    #[test]
    fn test_predicts_nearest_label() {
        let tmp = TempDir::new().unwrap();
        write_sample(tmp.path(), "alice", "1.png", [200, 10, 10]);
        write_sample(tmp.path(), "bob", "1.png", [10, 10, 200]);

        let mut recognizer = EmbeddingGalleryRecognizer::new(Box::new(MeanColorEmbedder), tmp.path());
        assert_eq!(recognizer.known_identities(), 2);

        let prediction = recognizer.predict(&solid_frame([10, 10, 190])).unwrap();
        assert_eq!(prediction.label, "bob");
        assert!(prediction.raw_confidence > 0.99);
        assert!(prediction.normalized_confidence > 99.0);
    }

    #[test]
    fn test_empty_gallery_fails_prediction() {
        let tmp = TempDir::new().unwrap();
        let mut recognizer = EmbeddingGalleryRecognizer::new(Box::new(MeanColorEmbedder), tmp.path());
        assert_eq!(recognizer.known_identities(), 0);
        assert!(recognizer.predict(&solid_frame([1, 2, 3])).is_err());
    }

    #[test]
    fn test_reload_picks_up_new_enrollments() {
        let tmp = TempDir::new().unwrap();
        let mut recognizer = EmbeddingGalleryRecognizer::new(Box::new(MeanColorEmbedder), tmp.path());
        assert!(recognizer.reload().is_err());

        write_sample(tmp.path(), "carol", "1.png", [0, 200, 0]);
        assert_eq!(recognizer.reload().unwrap(), 1);
        assert_eq!(recognizer.predict(&solid_frame([0, 90, 0])).unwrap().label, "carol");
    }

    #[test]
    fn test_failed_reload_keeps_previous_gallery() {
        let tmp = TempDir::new().unwrap();
        let faces = tmp.path().join("faces");
        write_sample(&faces, "carol", "1.png", [0, 200, 0]);
        let mut recognizer = EmbeddingGalleryRecognizer::new(Box::new(MeanColorEmbedder), &faces);

        std::fs::remove_dir_all(&faces).unwrap();
        assert!(recognizer.reload().is_err());
        assert_eq!(recognizer.known_identities(), 1);
    }
}
