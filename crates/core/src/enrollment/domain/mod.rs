pub mod face_capture;
