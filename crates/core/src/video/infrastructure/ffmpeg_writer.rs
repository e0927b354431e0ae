use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::Rational;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

const FALLBACK_FPS: i32 = 30;

/// Target bitrate per pixel per frame. The MPEG-4 encoder default is far too
/// low for face footage.
const BITS_PER_PIXEL: f64 = 0.2;

/// Encodes clips as MPEG-4 video via ffmpeg-next.
///
/// The container follows the output extension (`.mov` for clips). Frames
/// must match the size given at open.
pub struct FfmpegWriter {
    encoding: Option<Encoding>,
}

struct Encoding {
    output: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    to_yuv: Scaler,
    width: u32,
    height: u32,
    time_base: Rational,
    next_pts: i64,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self { encoding: None }
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoding {
    fn start(path: &Path, metadata: &VideoMetadata) -> Result<Self, Box<dyn std::error::Error>> {
        let (width, height) = (metadata.width, metadata.height);
        if width == 0 || height == 0 {
            return Err(format!("FfmpegWriter: invalid frame size {width}x{height}").into());
        }
        let fps = match metadata.fps.round() as i32 {
            n if n > 0 => n,
            _ => FALLBACK_FPS,
        };
        let time_base = Rational(1, fps);

        let mut output = ffmpeg_next::format::output(path)?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut stream = output.add_stream(Some(codec))?;

        let mut config = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        config.set_width(width);
        config.set_height(height);
        config.set_format(Pixel::YUV420P);
        config.set_time_base(time_base);
        config.set_frame_rate(Some(Rational(fps, 1)));
        config.set_bit_rate((width as f64 * height as f64 * fps as f64 * BITS_PER_PIXEL) as usize);
        if global_header {
            config.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = config.open_with(ffmpeg_next::Dictionary::new())?;
        stream.set_parameters(&encoder);
        output.write_header()?;

        let to_yuv = Scaler::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            Flags::BILINEAR,
        )?;

        Ok(Self {
            output,
            encoder,
            to_yuv,
            width,
            height,
            time_base,
            next_pts: 0,
        })
    }

    fn push(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if (frame.width(), frame.height(), frame.channels()) != (self.width, self.height, 3) {
            return Err(format!(
                "FfmpegWriter: frame is {}x{}x{}, expected {}x{}x3",
                frame.width(),
                frame.height(),
                frame.channels(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb = VideoFrame::new(Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let row_len = self.width as usize * 3;
        for (dst, src) in rgb
            .data_mut(0)
            .chunks_mut(stride)
            .zip(frame.data().chunks(row_len))
        {
            dst[..row_len].copy_from_slice(src);
        }

        let mut yuv = VideoFrame::empty();
        self.to_yuv.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(self.next_pts));
        self.encoder.send_frame(&yuv)?;
        self.next_pts += 1;
        self.write_packets()
    }

    fn finish(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.encoder.send_eof()?;
        self.write_packets()?;
        self.output.write_trailer()?;
        Ok(())
    }

    fn write_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let stream_time_base = self
            .output
            .stream(0)
            .ok_or("FfmpegWriter: missing stream")?
            .time_base();
        let mut packet = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.time_base, stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(&mut self, path: &Path, metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        self.encoding = Some(Encoding::start(path, metadata)?);
        log::debug!("Encoding {} at {}x{}", path.display(), metadata.width, metadata.height);
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.encoding
            .as_mut()
            .ok_or("FfmpegWriter: not opened")?
            .push(frame)
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.encoding.take() {
            Some(encoding) => encoding.finish(),
            None => Ok(()),
        }
    }
}
