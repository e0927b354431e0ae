pub mod arcface_embedder;
pub mod embedding_gallery_recognizer;
pub mod face_gallery;
pub mod timeout_recognizer;
