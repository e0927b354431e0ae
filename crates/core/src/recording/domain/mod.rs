pub mod clip_layout;
pub mod recorder;
pub mod recording_handle;
