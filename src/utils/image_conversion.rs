//! RGB/YUV conversion and image file loading for frame buffers.
//!
//! The tracker's histograms are defined over full-range BT.601 YUV, so
//! decoded RGB images are converted into a packed `Y U V` buffer before they
//! are wrapped as a [`Frame`].

use crate::frame::Frame;
use crate::utils::safe_cast::f64_to_u8_saturate;
use crate::{Error, Result};
use image::{Rgb, RgbImage};
use std::path::Path;

/// Convert one RGB pixel to full-range BT.601 YUV
#[must_use]
pub fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let v = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    [f64_to_u8_saturate(y), f64_to_u8_saturate(u), f64_to_u8_saturate(v)]
}

/// Convert one full-range BT.601 YUV pixel back to RGB
#[must_use]
pub fn yuv_to_rgb([y, u, v]: [u8; 3]) -> [u8; 3] {
    let y = f64::from(y);
    let u = f64::from(u) - 128.0;
    let v = f64::from(v) - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [f64_to_u8_saturate(r), f64_to_u8_saturate(g), f64_to_u8_saturate(b)]
}

/// Owned, packed YUV image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl YuvImage {
    /// Convert a decoded RGB image
    #[must_use]
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let data = rgb.pixels().flat_map(|Rgb(pixel)| rgb_to_yuv(*pixel)).collect();
        Self {
            data,
            width: rgb.width() as usize,
            height: rgb.height() as usize,
        }
    }

    /// Decode an image file in any format the `image` crate supports
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let decoded = image::open(path)?;
        Ok(Self::from_rgb(&decoded.to_rgb8()))
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Borrow as a packed frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty image.
    pub fn as_frame(&self) -> Result<Frame<&[u8]>> {
        Frame::packed(&self.data[..], self.width, self.height)
    }

    /// Borrow as a writable packed frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty image.
    pub fn as_frame_mut(&mut self) -> Result<Frame<&mut [u8]>> {
        Frame::packed(&mut self.data[..], self.width, self.height)
    }

    /// Convert back to RGB
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a dimension does not fit `u32`.
    pub fn to_rgb(&self) -> Result<RgbImage> {
        let width = u32::try_from(self.width).map_err(|e| Error::InvalidInput(format!("Image width: {e}")))?;
        let height = u32::try_from(self.height).map_err(|e| Error::InvalidInput(format!("Image height: {e}")))?;
        let rgb = self
            .data
            .chunks_exact(3)
            .flat_map(|yuv| yuv_to_rgb([yuv[0], yuv[1], yuv[2]]))
            .collect();
        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| Error::InvalidInput(format!("YUV buffer does not hold {width}x{height} pixels")))
    }

    /// Write as an RGB image; the format follows the file extension
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be encoded or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_rgb()?.save(path)?;
        Ok(())
    }
}
