use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Abstracts clip encoding so recording doesn't depend on a specific codec
/// library.
///
/// A writer can be reopened for a new path after `close`.
pub trait VideoWriter: Send {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes buffered frames and finalizes the container. The file is
    /// complete once this returns.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
