use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::open_session;

/// Used when the model's input shape is dynamic.
const FALLBACK_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.25;

const NMS_IOU_THRESHOLD: f64 = 0.45;

/// Letterbox padding value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Face detector for YOLO face models (e.g. the WIDER FACE pose variant)
/// run through ONNX Runtime.
///
/// Only the box and score columns of each output row are read; keypoints
/// are ignored. After NMS the largest remaining face wins.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;
        let input_size = model_input_size(&session).unwrap_or(FALLBACK_INPUT_SIZE);
        log::debug!("YOLO input size {input_size}, confidence {confidence}");
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    /// Scored candidates in frame coordinates, before NMS.
    fn candidates(&mut self, frame: &Frame) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let input = ort::value::Tensor::from_array(letterbox.tensor(frame))?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        let shape = output.shape().to_vec();
        let data = output.as_slice().ok_or("YOLO output is not contiguous")?;
        let rows = OutputRows::new(&shape, data)?;

        Ok((0..rows.count)
            .filter_map(|i| {
                let score = rows.get(i, 4);
                if score < self.confidence {
                    return None;
                }
                let (cx, cy, w, h) = (rows.get(i, 0), rows.get(i, 1), rows.get(i, 2), rows.get(i, 3));
                let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
                let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
                Some(Candidate {
                    corners: [x1, y1, x2, y2],
                    score,
                })
            })
            .collect())
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceBox>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(None);
        }
        let candidates = self.candidates(frame)?;
        let boxes: Vec<FaceBox> = suppress_overlaps(candidates, NMS_IOU_THRESHOLD)
            .iter()
            .map(|c| c.to_face_box(frame.width(), frame.height()))
            .collect();
        Ok(FaceBox::largest(&boxes))
    }
}

fn model_input_size(session: &ort::session::Session) -> Option<u32> {
    match session.inputs().first()?.dtype() {
        ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
            Some(shape[2] as u32)
        }
        _ => None,
    }
}

/// Row accessor for `[1, features, rows]` (transposed) or `[1, rows, features]`.
struct OutputRows<'a> {
    data: &'a [f32],
    count: usize,
    features: usize,
    transposed: bool,
}

impl<'a> OutputRows<'a> {
    fn new(shape: &[usize], data: &'a [f32]) -> Result<Self, Box<dyn std::error::Error>> {
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (count, features) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if features < 5 {
            return Err(format!("YOLO output has {features} features per row, need 5").into());
        }
        Ok(Self {
            data,
            count,
            features,
            transposed,
        })
    }

    fn get(&self, row: usize, feature: usize) -> f64 {
        let index = if self.transposed {
            feature * self.count + row
        } else {
            row * self.features + feature
        };
        self.data[index] as f64
    }
}

/// Aspect-preserving resize into a square model input, centred with padding.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    size: u32,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    scaled_w: u32,
    scaled_h: u32,
}

impl Letterbox {
    fn fit(frame_w: u32, frame_h: u32, size: u32) -> Self {
        let scale = (size as f64 / frame_w as f64).min(size as f64 / frame_h as f64);
        let scaled_w = ((frame_w as f64 * scale).round() as u32).min(size);
        let scaled_h = ((frame_h as f64 * scale).round() as u32).min(size);
        Self {
            size,
            scale,
            pad_x: (size - scaled_w) / 2,
            pad_y: (size - scaled_h) / 2,
            scaled_w,
            scaled_h,
        }
    }

    /// NCHW float tensor in 0..1, nearest-neighbour sampled.
    fn tensor(&self, frame: &Frame) -> Array4<f32> {
        let side = self.size as usize;
        let mut tensor = Array4::<f32>::from_elem((1, 3, side, side), PAD_VALUE);
        let src = frame.as_ndarray();
        let max_x = frame.width() as usize - 1;
        let max_y = frame.height() as usize - 1;

        for y in 0..self.scaled_h as usize {
            let sy = ((y as f64 / self.scale) as usize).min(max_y);
            let ty = self.pad_y as usize + y;
            for x in 0..self.scaled_w as usize {
                let sx = ((x as f64 / self.scale) as usize).min(max_x);
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[sy, sx, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps a point in model input space back to frame pixels.
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    /// x1, y1, x2, y2 in frame pixels.
    corners: [f64; 4],
    score: f64,
}

impl Candidate {
    fn area(&self) -> f64 {
        let [x1, y1, x2, y2] = self.corners;
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f64 {
        let [ax1, ay1, ax2, ay2] = self.corners;
        let [bx1, by1, bx2, by2] = other.corners;
        let overlap = (ax2.min(bx2) - ax1.max(bx1)).max(0.0) * (ay2.min(by2) - ay1.max(by1)).max(0.0);
        if overlap <= 0.0 {
            return 0.0;
        }
        overlap / (self.area() + other.area() - overlap)
    }

    /// Rounds to whole pixels and clamps to the frame.
    fn to_face_box(&self, frame_w: u32, frame_h: u32) -> FaceBox {
        let clamp_x = |v: f64| v.round().clamp(0.0, frame_w as f64) as i32;
        let clamp_y = |v: f64| v.round().clamp(0.0, frame_h as f64) as i32;
        let [x1, y1, x2, y2] = self.corners;
        let (left, top) = (clamp_x(x1), clamp_y(y1));
        FaceBox::new(
            left,
            top,
            (clamp_x(x2) - left).max(0),
            (clamp_y(y2) - top).max(0),
        )
    }
}

/// Greedy NMS, highest score first.
fn suppress_overlaps(mut candidates: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
