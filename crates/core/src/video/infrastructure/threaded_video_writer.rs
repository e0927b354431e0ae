use std::path::Path;
use std::thread::JoinHandle;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;
type WriterOutcome = (Box<dyn VideoWriter>, Result<(), SendError>);

/// Offloads encoding to a dedicated writer thread fed through a bounded
/// channel.
///
/// `open` runs on the caller's thread so open errors surface immediately.
/// `close` blocks until the writer thread has drained the channel and
/// finalized the file. A write error on the writer thread is reported by
/// the next `write` or by `close`.
pub struct ThreadedVideoWriter {
    idle: Option<Box<dyn VideoWriter>>,
    active: Option<ActiveWriter>,
    channel_capacity: usize,
}

struct ActiveWriter {
    frame_tx: crossbeam_channel::Sender<Frame>,
    handle: JoinHandle<WriterOutcome>,
}

impl ThreadedVideoWriter {
    pub fn new(inner: Box<dyn VideoWriter>) -> Self {
        Self::with_capacity(inner, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(inner: Box<dyn VideoWriter>, channel_capacity: usize) -> Self {
        Self {
            idle: Some(inner),
            active: None,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Stops the writer thread and takes the inner writer back.
    fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        drop(active.frame_tx);
        let (writer, result) = active
            .handle
            .join()
            .map_err(|_| "video writer thread panicked")?;
        self.idle = Some(writer);
        result.map_err(|e| -> Box<dyn std::error::Error> { e })
    }
}

impl VideoWriter for ThreadedVideoWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.finish()?;
        let mut writer = self.idle.take().ok_or("video writer is unavailable")?;
        if let Err(e) = writer.open(path, metadata) {
            self.idle = Some(writer);
            return Err(e);
        }

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(self.channel_capacity);
        let handle = spawn_writer(writer, frame_rx);
        self.active = Some(ActiveWriter { frame_tx, handle });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let active = self.active.as_ref().ok_or("ThreadedVideoWriter: not opened")?;
        if active.frame_tx.send(frame.clone()).is_ok() {
            return Ok(());
        }
        // The writer thread stopped early; surface its error.
        self.finish()?;
        Err("video writer thread stopped".into())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.finish()
    }
}

impl Drop for ThreadedVideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::warn!("Closing video writer failed: {e}");
        }
    }
}

fn spawn_writer(
    mut writer: Box<dyn VideoWriter>,
    frame_rx: crossbeam_channel::Receiver<Frame>,
) -> JoinHandle<WriterOutcome> {
    std::thread::spawn(move || {
        let mut result: Result<(), SendError> = Ok(());
        for frame in frame_rx {
            if let Err(e) = writer.write(&frame) {
                result = Err(e.to_string().into());
                break;
            }
        }
        if let Err(e) = writer.close() {
            if result.is_ok() {
                result = Err(e.to_string().into());
            }
        }
        (writer, result)
    })
}
