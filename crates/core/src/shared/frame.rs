use ndarray::ArrayView3;

use crate::shared::face_box::FaceBox;

/// A decoded image: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at the decoding boundary only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
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

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copies the pixels covered by `face_box`, clipped to the frame.
    ///
    /// A box lying fully outside the frame yields an empty frame.
    pub fn crop(&self, face_box: &FaceBox) -> Frame {
        let Some(clipped) = face_box.clip_to(self.width, self.height) else {
            return Frame::new(Vec::new(), 0, 0, self.channels);
        };

        let ch = self.channels as usize;
        let src_stride = self.width as usize * ch;
        let row_len = clipped.width as usize * ch;
        let mut data = Vec::with_capacity(row_len * clipped.height as usize);
        for row in clipped.y as usize..(clipped.y + clipped.height) as usize {
            let start = row * src_stride + clipped.x as usize * ch;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Frame::new(data, clipped.width as u32, clipped.height as u32, self.channels)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
