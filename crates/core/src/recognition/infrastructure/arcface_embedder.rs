/// ArcFace face embedder using ONNX Runtime.
///
/// Produces 512-d L2-normalized embeddings whose dot product is the cosine
/// similarity used for gallery matching.
use std::path::Path;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::open_session;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct ArcFaceEmbedder {
    session: ort::session::Session,
}

impl ArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: open_session(model_path)?,
        })
    }
}

impl FaceEmbedder for ArcFaceEmbedder {
    fn embed(&mut self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        if face.is_empty() {
            return Err("cannot embed an empty crop".into());
        }
        let tensor = preprocess(face.data(), face.width(), face.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_preprocess_shape_for_non_square_crop() {
        let data = vec![128u8; 60 * 40 * 3];
        let tensor = preprocess(&data, 60, 40);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let white = preprocess(&vec![255u8; 10 * 10 * 3], 10, 10);
        let black = preprocess(&vec![0u8; 10 * 10 * 3], 10, 10);
        assert_abs_diff_eq!(white[[0, 0, 0, 0]], 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(black[[0, 2, 111, 111]], -1.0, epsilon = 0.01);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let mut data = Vec::new();
        for _ in 0..(4 * 4) {
            data.extend_from_slice(&[255, 0, 128]);
        }
        let tensor = preprocess(&data, 4, 4);
        assert_abs_diff_eq!(tensor[[0, 0, 5, 5]], 1.0, epsilon = 0.01);
        assert_abs_diff_eq!(tensor[[0, 1, 5, 5]], -1.0, epsilon = 0.01);
        assert_abs_diff_eq!(tensor[[0, 2, 5, 5]], 0.0, epsilon = 0.01);
    }
}
