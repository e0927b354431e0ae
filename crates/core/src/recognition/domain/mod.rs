pub mod face_embedder;
pub mod face_recognizer;
pub mod recognition_voter;
pub mod vote_tally;
