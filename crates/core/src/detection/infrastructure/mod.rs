pub mod onnx_yolo_detector;
pub mod skip_frame_detector;
