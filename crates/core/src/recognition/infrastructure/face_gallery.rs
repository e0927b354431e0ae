use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::infrastructure::arcface_embedder::l2_normalize;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("faces directory not found: {0}")]
    MissingDirectory(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable face images under {0}")]
    Empty(PathBuf),
}

/// One enrolled identity: the mean embedding of its sample images.
#[derive(Clone, Debug)]
pub struct GalleryEntry {
    pub label: String,
    pub centroid: Vec<f32>,
    pub samples: usize,
}

/// Enrolled identities, one per sub-directory of the faces directory.
///
/// ```text
/// faces/
///   alice/  001.jpg 002.jpg
///   bob/    a.png
/// ```
#[derive(Clone, Debug, Default)]
pub struct FaceGallery {
    entries: Vec<GalleryEntry>,
}

impl FaceGallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Embeds every image under `dir/<label>/` and averages per label.
    ///
    /// Unreadable images and labels without a usable sample are skipped with
    /// a warning. Labels are visited in name order.
    pub fn load(dir: &Path, embedder: &mut dyn FaceEmbedder) -> Result<Self, GalleryError> {
        if !dir.is_dir() {
            return Err(GalleryError::MissingDirectory(dir.to_path_buf()));
        }

        let mut entries = Vec::new();
        for label_dir in sorted_children(dir)?.into_iter().filter(|p| p.is_dir()) {
            let Some(label) = label_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let mut sum: Vec<f32> = Vec::new();
            let mut samples = 0;
            for image_path in sorted_children(&label_dir)?
                .into_iter()
                .filter(|p| is_image_file(p))
            {
                let embedding = match load_frame(&image_path)
                    .and_then(|frame| embedder.embed(&frame))
                {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        log::warn!("Skipping {}: {e}", image_path.display());
                        continue;
                    }
                };
                if sum.is_empty() {
                    sum = vec![0.0; embedding.len()];
                }
                if embedding.len() != sum.len() {
                    log::warn!("Skipping {}: embedding size mismatch", image_path.display());
                    continue;
                }
                for (acc, v) in sum.iter_mut().zip(&embedding) {
                    *acc += v;
                }
                samples += 1;
            }

            if samples == 0 {
                log::warn!("No usable images for '{label}', skipping");
                continue;
            }
            l2_normalize(&mut sum);
            log::debug!("Enrolled '{label}' from {samples} images");
            entries.push(GalleryEntry {
                label: label.to_string(),
                centroid: sum,
                samples,
            });
        }

        if entries.is_empty() {
            return Err(GalleryError::Empty(dir.to_path_buf()));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Label with the highest cosine similarity to `embedding`; the first
    /// entry wins ties.
    pub fn best_match(&self, embedding: &[f32]) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for entry in &self.entries {
            let sim = cosine_similarity(&entry.centroid, embedding);
            if best.map_or(true, |(_, b)| sim > b) {
                best = Some((entry.label.as_str(), sim));
            }
        }
        best
    }
}

/// Dot product of L2-normalized vectors equals cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let read_err = |source| GalleryError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(read_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    paths.sort();
    Ok(paths)
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn load_frame(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, 0))
}
