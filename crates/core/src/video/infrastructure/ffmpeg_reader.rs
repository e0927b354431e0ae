use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Decodes frames from a file or stream URL via ffmpeg-next.
///
/// Every frame is converted to packed RGB24. Live sources usually report no
/// frame count and sometimes no frame rate.
pub struct FfmpegReader {
    source: Option<Source>,
}

struct Source {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    to_rgb: Scaler,
    stream_index: usize,
    metadata: VideoMetadata,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self { source: None }
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.source.as_ref().map(|s| &s.metadata)
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let input = ffmpeg_next::format::input(path)?;

        let (stream_index, decoder, fps, total_frames) = {
            let stream = input
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or("No video stream found")?;
            let context =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = context.decoder().video()?;
            let rate = stream.rate();
            let fps = match rate.denominator() {
                0 => 0.0,
                d => rate.numerator() as f64 / d as f64,
            };
            (stream.index(), decoder, fps, stream.frames().max(0) as usize)
        };

        let (width, height) = (decoder.width(), decoder.height());
        let to_rgb = Scaler::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {} ({width}x{height} @ {fps:.2} fps, {})",
            path.display(),
            metadata.codec
        );

        self.source = Some(Source {
            input,
            decoder,
            to_rgb,
            stream_index,
            metadata: metadata.clone(),
        });
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        match self.source.as_mut() {
            Some(source) => Box::new(DecodedFrames {
                source,
                next_index: 0,
                phase: Phase::Reading,
            }),
            None => Box::new(std::iter::once(Err("FfmpegReader: not opened".into()))),
        }
    }

    fn close(&mut self) {
        self.source = None;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Feeding packets from the container.
    Reading,
    /// End of input signalled; emptying the decoder's buffered frames.
    Draining,
    Done,
}

struct DecodedFrames<'a> {
    source: &'a mut Source,
    next_index: usize,
    phase: Phase,
}

impl DecodedFrames<'_> {
    /// Pulls one buffered frame out of the decoder, if any.
    fn receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = VideoFrame::empty();
        self.source.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb = VideoFrame::empty();
        if let Err(e) = self.source.to_rgb.run(&decoded, &mut rgb) {
            return Some(Err(e.into()));
        }
        let (width, height) = (self.source.metadata.width, self.source.metadata.height);
        let frame = Frame::new(packed_rgb(&rgb, width, height), width, height, 3, self.next_index);
        self.next_index += 1;
        Some(Ok(frame))
    }

    /// Sends the next video packet to the decoder. Returns `false` at end of
    /// input.
    fn feed(&mut self) -> bool {
        loop {
            let Some((stream, packet)) = self.source.input.packets().next() else {
                return false;
            };
            if stream.index() != self.source.stream_index {
                continue;
            }
            match self.source.decoder.send_packet(&packet) {
                Ok(()) => return true,
                Err(e) => log::debug!("Dropping undecodable packet: {e}"),
            }
        }
    }
}

impl Iterator for DecodedFrames<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Done => return None,
                Phase::Reading => {
                    if let Some(frame) = self.receive() {
                        return Some(frame);
                    }
                    if !self.feed() {
                        let _ = self.source.decoder.send_eof();
                        self.phase = Phase::Draining;
                    }
                }
                Phase::Draining => {
                    let frame = self.receive();
                    if frame.is_none() {
                        self.phase = Phase::Done;
                    }
                    return frame;
                }
            }
        }
    }
}

/// Copies plane 0 into a tightly packed `width * height * 3` buffer, dropping
/// the per-row stride padding.
fn packed_rgb(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_len = width as usize * 3;
    frame
        .data(0)
        .chunks(stride)
        .take(height as usize)
        .flat_map(|row| &row[..row_len])
        .copied()
        .collect()
}
