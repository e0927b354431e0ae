pub mod clock;
pub mod constants;
pub mod face_box;
pub mod frame;
pub mod model_resolver;
pub mod onnx_session;
pub mod session_config;
pub mod video_metadata;
