use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::region::Region;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Channel order is fixed to RGB at the capture boundary; nothing downstream
/// converts colour spaces. `index` is the capture sequence number.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
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
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Solid-colour RGB frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 3, index)
    }

    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
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

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels into an `image` buffer for drawing and encoding.
    ///
    /// Returns `None` for non-RGB frames.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.channels != 3 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn into_rgb_image(self) -> Option<RgbImage> {
        if self.channels != 3 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data)
    }

    /// Mirrors the frame around its vertical axis in place.
    pub fn flip_horizontal(&mut self) {
        let row_len = self.width as usize * self.channels as usize;
        let channels = self.channels as usize;
        if row_len == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            let w = row.len() / channels;
            for x in 0..w / 2 {
                let a = x * channels;
                let b = (w - 1 - x) * channels;
                for c in 0..channels {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// Resizes to exact dimensions.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let Some(img) = self.to_rgb_image() else {
            return self.clone();
        };
        let out = image::imageops::resize(&img, width.max(1), height.max(1), FilterType::Triangle);
        Frame::from_rgb_image(out, self.index)
    }

    /// Resizes both axes by `factor`, keeping at least one pixel per axis.
    pub fn scaled(&self, factor: f64) -> Frame {
        let w = ((self.width as f64 * factor).round() as u32).max(1);
        let h = ((self.height as f64 * factor).round() as u32).max(1);
        self.resized(w, h)
    }

    /// Copies the pixels inside `region`, clamped to the frame.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let clamped = region.clamped(self.width, self.height)?;
        let channels = self.channels as usize;
        let x1 = clamped.left as usize;
        let x2 = clamped.right as usize;
        let y1 = clamped.top as usize;
        let y2 = clamped.bottom as usize;
        let row_len = self.width as usize * channels;

        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * channels);
        for row in y1..y2 {
            let start = row * row_len + x1 * channels;
            let end = row * row_len + x2 * channels;
            data.extend_from_slice(&self.data[start..end]);
        }
        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_flip_horizontal_mirrors_rows() {
        let mut frame = gradient(4, 2);
        frame.flip_horizontal();
        let arr = frame.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 3);
        assert_eq!(arr[[0, 3, 0]], 0);
        assert_eq!(arr[[1, 1, 0]], 2);
        assert_eq!(arr[[1, 1, 1]], 1); // row untouched
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let original = gradient(5, 3);
        let mut frame = original.clone();
        frame.flip_horizontal();
        frame.flip_horizontal();
        assert_eq!(frame.data(), original.data());
    }

    #[test]
    fn test_scaled_quarter() {
        let frame = Frame::filled(640, 480, [10, 20, 30], 3);
        let small = frame.scaled(0.25);
        assert_eq!((small.width(), small.height()), (160, 120));
        assert_eq!(small.index(), 3);
        assert_eq!(&small.data()[0..3], &[10, 20, 30]);
    }

    #[test]
    fn test_resized_exact_square() {
        let frame = Frame::filled(640, 480, [0, 0, 0], 0);
        let square = frame.resized(320, 320);
        assert_eq!((square.width(), square.height()), (320, 320));
        assert_eq!(square.data().len(), 320 * 320 * 3);
    }

    #[test]
    fn test_crop_copies_region() {
        let frame = gradient(10, 10);
        let crop = frame.crop(&Region::new(2, 3, 5, 6)).unwrap();
        assert_eq!((crop.width(), crop.height()), (3, 3));
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 3); // x
        assert_eq!(arr[[0, 0, 1]], 2); // y
    }

    #[test]
    fn test_crop_clamps_and_rejects_empty() {
        let frame = gradient(10, 10);
        let crop = frame.crop(&Region::new(8, 8, 20, 20)).unwrap();
        assert_eq!((crop.width(), crop.height()), (2, 2));
        assert!(frame.crop(&Region::new(12, 0, 20, 5)).is_none());
    }

    #[test]
    fn test_into_rgb_image_roundtrip() {
        let frame = gradient(3, 2);
        let img = frame.clone().into_rgb_image().unwrap();
        assert_eq!(img.get_pixel(2, 1).0, [2, 1, 7]);
        assert_eq!(Frame::from_rgb_image(img, 0).data(), frame.data());
    }
}
