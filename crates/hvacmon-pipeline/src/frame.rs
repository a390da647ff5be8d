//! Camera frames: BGR pixel storage, ROI cropping, and luminance.
//!
//! The camera delivers 8-bit, 3-channel images in B, G, R channel order.
//! [`Frame`] keeps that order so decoding never depends on a hidden
//! swizzle, and offers conversions to and from the `image` crate's RGB
//! buffers at the I/O boundary.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::config::Roi;
use crate::types::{Dimensions, PanelError};

/// An immutable BGR camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Pixel buffer. Channel 0 is blue, channel 2 is red.
    bgr: RgbImage,
}

impl Frame {
    /// Wrap a raw interleaved BGR buffer.
    ///
    /// Returns `None` if `data.len() != width * height * 3`.
    #[must_use]
    pub fn from_bgr_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|bgr| Self { bgr })
    }

    /// Build a frame by evaluating `f(x, y) -> [b, g, r]` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        Self {
            bgr: RgbImage::from_fn(width, height, |x, y| Rgb(f(x, y))),
        }
    }

    /// Convert an RGB image into a BGR frame.
    #[must_use]
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        Self::from_fn(rgb.width(), rgb.height(), |x, y| {
            let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
            [b, g, r]
        })
    }

    /// Decode encoded image bytes (PNG, JPEG, BMP, WebP) into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::EmptyInput`] if `bytes` is empty.
    /// Returns [`PanelError::ImageDecode`] if the format is unrecognized
    /// or the data is corrupt.
    pub fn load(bytes: &[u8]) -> Result<Self, PanelError> {
        if bytes.is_empty() {
            return Err(PanelError::EmptyInput);
        }
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_rgb(&img.to_rgb8()))
    }

    /// Frame dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.bgr.width(), self.bgr.height())
    }

    /// The `[b, g, r]` value at column `x`, row `y`, if in bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.bgr.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Raw interleaved BGR bytes.
    #[must_use]
    pub fn as_bgr_raw(&self) -> &[u8] {
        self.bgr.as_raw()
    }

    /// Convert to an RGB image for encoding.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.bgr.width(), self.bgr.height(), |x, y| {
            let Rgb([b, g, r]) = *self.bgr.get_pixel(x, y);
            Rgb([r, g, b])
        })
    }

    /// Copy out the region of interest.
    ///
    /// Returns `None` if `roi` extends past the frame. Unlike
    /// `image::imageops::crop_imm`, the region is never silently clamped.
    #[must_use]
    pub fn crop(&self, roi: &Roi) -> Option<Self> {
        if !roi.fits_within(self.dimensions()) {
            return None;
        }
        let view = image::imageops::crop_imm(&self.bgr, roi.x, roi.y, roi.width, roi.height);
        Some(Self {
            bgr: view.to_image(),
        })
    }

    /// Single-channel luminance image.
    ///
    /// Uses the `0.299 R + 0.587 G + 0.114 B` weights in 14-bit fixed
    /// point with rounding, so a gray pixel `(v, v, v)` maps to exactly `v`.
    #[must_use]
    pub fn luminance(&self) -> GrayImage {
        GrayImage::from_fn(self.bgr.width(), self.bgr.height(), |x, y| {
            let Rgb([b, g, r]) = *self.bgr.get_pixel(x, y);
            Luma([luma(b, g, r)])
        })
    }
}

/// Fixed-point luminance of one BGR pixel.
fn luma(b: u8, g: u8, r: u8) -> u8 {
    const R_WEIGHT: u32 = 4899;
    const G_WEIGHT: u32 = 9617;
    const B_WEIGHT: u32 = 1868;
    const SHIFT: u32 = 14;

    let weighted = u32::from(r) * R_WEIGHT + u32::from(g) * G_WEIGHT + u32::from(b) * B_WEIGHT;
    // Weights sum to 2^14, so the result never exceeds 255.
    u8::try_from((weighted + (1 << (SHIFT - 1))) >> SHIFT).unwrap_or(u8::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn raw_buffer_length_must_match() {
        assert!(Frame::from_bgr_raw(2, 2, vec![0; 12]).is_some());
        assert!(Frame::from_bgr_raw(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn from_rgb_swaps_red_and_blue() {
        let rgb = RgbImage::from_fn(1, 1, |_, _| Rgb([200, 100, 50]));
        let frame = Frame::from_rgb(&rgb);
        assert_eq!(frame.pixel(0, 0), Some([50, 100, 200]));
        assert_eq!(frame.to_rgb(), rgb);
    }

    #[test]
    fn load_empty_input() {
        assert!(matches!(Frame::load(&[]), Err(PanelError::EmptyInput)));
    }

    #[test]
    fn load_corrupt_input() {
        assert!(matches!(
            Frame::load(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(PanelError::ImageDecode(_))
        ));
    }

    #[test]
    fn load_png_preserves_colors() {
        let rgb = RgbImage::from_fn(3, 2, |x, y| {
            Rgb([u8::try_from(x * 40).unwrap(), u8::try_from(y * 40).unwrap(), 7])
        });
        let frame = Frame::load(&encode_png(&rgb)).unwrap();
        assert_eq!(frame.dimensions(), Dimensions::new(3, 2));
        assert_eq!(frame.pixel(2, 1), Some([7, 40, 80]));
    }

    #[test]
    fn crop_copies_region() {
        let frame = Frame::from_fn(10, 8, |x, y| {
            [u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 0]
        });
        let roi = Roi::new(3, 2, 4, 5);
        let cropped = frame.crop(&roi).unwrap();
        assert_eq!(cropped.dimensions(), Dimensions::new(4, 5));
        assert_eq!(cropped.pixel(0, 0), Some([3, 2, 0]));
        assert_eq!(cropped.pixel(3, 4), Some([6, 6, 0]));
    }

    #[test]
    fn crop_rejects_region_past_edge() {
        let frame = Frame::from_fn(10, 8, |_, _| [0, 0, 0]);
        assert!(frame.crop(&Roi::new(7, 0, 4, 2)).is_none());
        assert!(frame.crop(&Roi::new(0, 6, 2, 3)).is_none());
        assert!(frame.crop(&Roi::new(6, 4, 4, 4)).is_some());
    }

    #[test]
    fn gray_pixels_keep_their_level() {
        for v in [0u8, 1, 2, 5, 10, 12, 15, 128, 254, 255] {
            assert_eq!(luma(v, v, v), v, "level {v}");
        }
    }

    #[test]
    fn luminance_weights_green_over_red_over_blue() {
        let frame = Frame::from_fn(3, 1, |x, _| match x {
            0 => [0, 0, 255],
            1 => [0, 255, 0],
            _ => [255, 0, 0],
        });
        let gray = frame.luminance();
        let (r, g, b) = (gray.get_pixel(0, 0)[0], gray.get_pixel(1, 0)[0], gray.get_pixel(2, 0)[0]);
        assert_eq!((r, g, b), (76, 150, 29));
    }
}
