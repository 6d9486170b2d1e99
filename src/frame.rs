//! Borrowed pixel buffers and the rectangles the tracker reads from them.
//!
//! The tracker never owns image memory: each frame arrives as a packed,
//! row-strided buffer with three colour channels interleaved at fixed
//! offsets inside every pixel, and is dropped when the call returns.

use crate::utils::safe_cast::f64_to_usize_clamp;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Where the three colour channels live inside one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Bytes from one pixel to the next
    pub pixel_stride: usize,
    /// Byte offset of each channel inside a pixel
    pub offsets: [usize; 3],
}

impl ChannelLayout {
    /// Three bytes per pixel, channels in order
    pub const PACKED: Self = Self {
        pixel_stride: 3,
        offsets: [0, 1, 2],
    };

    /// Arbitrary interleaved layout, e.g. 4-byte `AYUV` is `(4, [1, 2, 3])`
    #[must_use]
    pub const fn interleaved(pixel_stride: usize, offsets: [usize; 3]) -> Self {
        Self { pixel_stride, offsets }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::PACKED
    }
}

/// Axis-aligned pixel window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    #[must_use]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// Window of half-extent `(half_width, half_height)` around a centre,
    /// clipped to a `bounds_width × bounds_height` image
    #[must_use]
    pub fn around(
        center_x: f64,
        center_y: f64,
        half_width: f64,
        half_height: f64,
        bounds_width: usize,
        bounds_height: usize,
    ) -> Self {
        let x0 = f64_to_usize_clamp(center_x - half_width, 0, bounds_width);
        let x1 = f64_to_usize_clamp(center_x + half_width, 0, bounds_width);
        let y0 = f64_to_usize_clamp(center_y - half_height, 0, bounds_height);
        let y1 = f64_to_usize_clamp(center_y + half_height, 0, bounds_height);
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }

    /// Intersection with `[0, width) × [0, height)`
    #[must_use]
    pub fn clip(&self, width: usize, height: usize) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Detector output: a box given by its centre and extent, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Candidate {
    #[must_use]
    pub const fn new(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }

    /// Scalar box size (mean of width and height)
    #[must_use]
    pub fn size(&self) -> f64 {
        0.5 * (self.width + self.height)
    }

    /// Centred window covering `scale` of the box, clipped to the image
    #[must_use]
    pub fn subwindow(&self, scale: f64, bounds_width: usize, bounds_height: usize) -> Rect {
        Rect::around(
            self.center_x,
            self.center_y,
            0.5 * scale * self.width,
            0.5 * scale * self.height,
            bounds_width,
            bounds_height,
        )
    }
}

/// A row-strided, three-channel pixel buffer
///
/// Read access needs `B: AsRef<[u8]>`; writing pixels additionally needs
/// `B: AsMut<[u8]>`.
#[derive(Debug, Clone)]
pub struct Frame<B> {
    data: B,
    width: usize,
    height: usize,
    stride: usize,
    layout: ChannelLayout,
}

impl<B: AsRef<[u8]>> Frame<B> {
    /// Wrap a buffer after checking it can hold `height` rows of `stride` bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty dimensions, channel offsets
    /// outside a pixel, rows shorter than a line of pixels, or a buffer too
    /// small for the described image.
    pub fn new(data: B, width: usize, height: usize, stride: usize, layout: ChannelLayout) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!("Empty frame: {width}x{height}")));
        }
        if layout.offsets.iter().any(|&offset| offset >= layout.pixel_stride) {
            return Err(Error::InvalidInput(format!(
                "Channel offsets {:?} do not fit a {}-byte pixel",
                layout.offsets, layout.pixel_stride
            )));
        }
        if stride < width * layout.pixel_stride {
            return Err(Error::InvalidInput(format!(
                "Stride {stride} is shorter than a row of {width} pixels"
            )));
        }
        let required = (height - 1) * stride + width * layout.pixel_stride;
        let available = data.as_ref().len();
        if available < required {
            return Err(Error::InvalidInput(format!(
                "Frame buffer holds {available} bytes, {width}x{height} needs {required}"
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            layout,
        })
    }

    /// Tightly packed three-byte pixels
    ///
    /// # Errors
    ///
    /// See [`Frame::new`].
    pub fn packed(data: B, width: usize, height: usize) -> Result<Self> {
        Self::new(data, width, height, width * 3, ChannelLayout::PACKED)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// The whole image as a window
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) outside frame");
        y * self.stride + x * self.layout.pixel_stride
    }

    /// Channel values of the pixel at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let base = self.offset(x, y);
        let data = self.data.as_ref();
        self.layout.offsets.map(|offset| data[base + offset])
    }

    /// Every `step`-th pixel of `rect` (clipped to the frame) in both axes,
    /// row by row, as `(x, y, pixel)`
    pub fn samples(&self, rect: Rect, step: usize) -> impl Iterator<Item = (usize, usize, [u8; 3])> + '_ {
        let rect = rect.clip(self.width, self.height);
        let step = step.max(1);
        (rect.y..rect.y + rect.height).step_by(step).flat_map(move |y| {
            (rect.x..rect.x + rect.width)
                .step_by(step)
                .map(move |x| (x, y, self.pixel(x, y)))
        })
    }

    /// Borrowed read-only view of the same pixels
    #[must_use]
    pub fn as_view(&self) -> Frame<&[u8]> {
        Frame {
            data: self.data.as_ref(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            layout: self.layout,
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Frame<B> {
    /// Overwrite the pixel at `(x, y)`
    pub fn set_pixel(&mut self, x: usize, y: usize, value: [u8; 3]) {
        let base = self.offset(x, y);
        let offsets = self.layout.offsets;
        let data = self.data.as_mut();
        for (offset, channel) in offsets.into_iter().zip(value) {
            data[base + offset] = channel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validation() {
        let data = vec![0u8; 10 * 4 * 3];
        assert!(Frame::packed(&data[..], 10, 4).is_ok());
        assert!(Frame::packed(&data[..], 10, 5).is_err());
        assert!(Frame::packed(&data[..], 0, 4).is_err());
        assert!(Frame::new(&data[..], 10, 4, 20, ChannelLayout::PACKED).is_err());
        assert!(Frame::new(&data[..], 5, 4, 15, ChannelLayout::interleaved(2, [0, 1, 2])).is_err());
    }

    #[test]
    fn test_pixel_access_with_layout() {
        // 2x1 frame, 4-byte pixels with channels at offsets 1..=3, padded rows
        let data: Vec<u8> = vec![9, 1, 2, 3, 9, 4, 5, 6, 0, 0];
        let frame = Frame::new(&data[..], 2, 1, 10, ChannelLayout::interleaved(4, [1, 2, 3])).unwrap();
        assert_eq!(frame.pixel(0, 0), [1, 2, 3]);
        assert_eq!(frame.pixel(1, 0), [4, 5, 6]);
    }

    #[test]
    fn test_set_pixel() {
        let mut data = vec![0u8; 4 * 4 * 3];
        let mut frame = Frame::packed(&mut data[..], 4, 4).unwrap();
        frame.set_pixel(2, 3, [7, 8, 9]);
        assert_eq!(frame.pixel(2, 3), [7, 8, 9]);
        assert_eq!(frame.pixel(3, 3), [0, 0, 0]);
    }

    #[test]
    fn test_samples_are_strided_and_clipped() {
        let data = vec![0u8; 10 * 10 * 3];
        let frame = Frame::packed(&data[..], 10, 10).unwrap();

        let all: Vec<_> = frame.samples(frame.bounds(), 1).collect();
        assert_eq!(all.len(), 100);

        let strided: Vec<_> = frame.samples(Rect::new(0, 0, 10, 10), 3).collect();
        assert_eq!(strided.len(), 16);
        assert_eq!((strided[1].0, strided[1].1), (3, 0));

        let clipped: Vec<_> = frame.samples(Rect::new(8, 8, 10, 10), 1).collect();
        assert_eq!(clipped.len(), 4);
    }

    #[test]
    fn test_rect_around_clips_to_bounds() {
        let rect = Rect::around(5.0, 5.0, 10.0, 2.0, 100, 100);
        assert_eq!(rect, Rect::new(0, 3, 15, 4));

        let outside = Rect::around(-50.0, -50.0, 10.0, 10.0, 100, 100);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_candidate_subwindow() {
        let candidate = Candidate::new(50.0, 40.0, 20.0, 10.0);
        assert_eq!(candidate.size(), 15.0);
        assert_eq!(candidate.subwindow(0.5, 100, 100), Rect::new(45, 38, 10, 5));
    }
}
