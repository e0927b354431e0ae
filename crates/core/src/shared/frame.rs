use std::sync::Arc;

use ndarray::ArrayView3;

use crate::shared::face_box::FaceBox;

/// A single video frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque. Pixels are immutable and shared, so cloning
/// a frame does not copy them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data: Arc::new(data),
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), self.data.as_slice())
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `region` (clamped to the frame) into a new frame.
    ///
    /// The crop keeps this frame's index. Returns an empty 0x0 frame when the
    /// region does not overlap the frame.
    pub fn crop(&self, region: &FaceBox) -> Frame {
        let fw = self.width as i32;
        let fh = self.height as i32;
        let x1 = region.x.clamp(0, fw);
        let y1 = region.y.clamp(0, fh);
        let x2 = (region.x + region.width).clamp(0, fw);
        let y2 = (region.y + region.height).clamp(0, fh);

        let cw = (x2 - x1).max(0) as usize;
        let ch = (y2 - y1).max(0) as usize;
        if cw == 0 || ch == 0 {
            return Frame::new(Vec::new(), 0, 0, self.channels, self.index);
        }

        let channels = self.channels as usize;
        let row_len = self.width as usize * channels;
        let mut data = Vec::with_capacity(cw * ch * channels);
        for row in y1 as usize..y2 as usize {
            let start = row * row_len + x1 as usize * channels;
            data.extend_from_slice(&self.data[start..start + cw * channels]);
        }

        Frame::new(data, cw as u32, ch as u32, self.channels, self.index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
