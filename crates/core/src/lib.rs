pub mod detection;
pub mod enrollment;
pub mod pipeline;
pub mod recognition;
pub mod recording;
pub mod shared;
pub mod tracking;
pub mod video;
