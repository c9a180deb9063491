//! Raster helpers: decoding, ink binarization and cropping to the trace.
//!
//! The only place the pipeline touches pixels. Everything downstream of
//! the vectorizer works on paths.

use image::GrayImage;
use imageproc::contrast::ThresholdType;

use crate::types::{DigitizeError, GuideTrace};

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) into grayscale.
///
/// # Errors
///
/// Returns [`DigitizeError::EmptyInput`] if `bytes` is empty and
/// [`DigitizeError::ImageDecode`] if the data cannot be decoded.
#[must_use = "returns the decoded grayscale image"]
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DigitizeError> {
    if bytes.is_empty() {
        return Err(DigitizeError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_luma8())
}

/// Mark ink pixels (darker than `threshold`) white and paper black.
///
/// Contour tracing treats non-zero pixels as foreground, so dark plot
/// lines on light paper have to be inverted first.
#[must_use]
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    // `BinaryInverted` marks pixels at or below its level; nothing is
    // darker than 0.
    threshold.checked_sub(1).map_or_else(
        || GrayImage::new(image.width(), image.height()),
        |level| imageproc::contrast::threshold(image, level, ThresholdType::BinaryInverted),
    )
}

/// A rectangular window of the source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width of the window.
    pub width: u32,
    /// Height of the window.
    pub height: u32,
}

impl CropRegion {
    /// The window covering a whole `width` x `height` image.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The part of a `width` x `height` image the trace can reach.
    ///
    /// Horizontally the window spans the trace plus half the pen width;
    /// vertically it is widened by `margin` on both sides. Returns
    /// `None` when the window misses the image or the trace is empty.
    #[must_use]
    pub fn around_trace(trace: &GuideTrace, width: u32, height: u32, margin: u32) -> Option<Self> {
        let first = trace.points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &trace.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        let half_pen = f64::from(trace.pen_width) / 2.0;
        let margin = f64::from(margin);

        let left = clamp_px((min_x - half_pen).floor(), width);
        let right = clamp_px((max_x + half_pen).ceil(), width);
        let top = clamp_px((min_y - margin).floor(), height);
        let bottom = clamp_px((max_y + margin).ceil(), height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    /// Copy this window out of `image`.
    #[must_use]
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        image::imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }

    /// Offset of the window's origin in source-image pixels.
    #[must_use]
    pub fn offset(&self) -> (f64, f64) {
        (f64::from(self.x), f64::from(self.y))
    }
}

/// Clamp a pixel coordinate into `0..=limit`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_px(v: f64, limit: u32) -> u32 {
    v.clamp(0.0, f64::from(limit)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn encode_png(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .ok();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode_grayscale(&[]), Err(DigitizeError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_return_decode_error() {
        let result = decode_grayscale(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(DigitizeError::ImageDecode(_))));
    }

    #[test]
    fn png_round_trips_through_decode() {
        let img = GrayImage::from_fn(7, 3, |x, _| image::Luma([u8::try_from(x * 30).unwrap()]));
        let decoded = decode_grayscale(&encode_png(&img)).unwrap();
        assert_eq!(decoded.dimensions(), (7, 3));
        assert_eq!(decoded.get_pixel(6, 2).0[0], 180);
    }

    #[test]
    fn binarize_marks_dark_pixels() {
        let img = GrayImage::from_fn(3, 1, |x, _| image::Luma([[0, 127, 128][x as usize]]));
        let bin = binarize(&img, 128);
        assert_eq!(bin.as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn binarize_extreme_thresholds() {
        let img = GrayImage::from_fn(3, 1, |x, _| image::Luma([[0, 254, 255][x as usize]]));
        assert_eq!(binarize(&img, 0).as_raw(), &vec![0, 0, 0]);
        assert_eq!(binarize(&img, 255).as_raw(), &vec![255, 255, 0]);
    }

    #[test]
    fn crop_spans_trace_plus_margin() {
        let trace = GuideTrace::new(vec![Point::new(100.0, 200.0), Point::new(300.0, 220.0)], 40);
        let crop = CropRegion::around_trace(&trace, 1000, 1000, 80).unwrap();
        assert_eq!(
            crop,
            CropRegion {
                x: 80,
                y: 120,
                width: 240,
                height: 180,
            }
        );
        assert_eq!(crop.offset(), (80.0, 120.0));
    }

    #[test]
    fn crop_is_clamped_to_image() {
        let trace = GuideTrace::new(vec![Point::new(5.0, 5.0), Point::new(60.0, 30.0)], 20);
        let crop = CropRegion::around_trace(&trace, 50, 40, 80).unwrap();
        assert_eq!(crop, CropRegion::full(50, 40));
        let img = GrayImage::new(50, 40);
        assert_eq!(crop.apply(&img).dimensions(), (50, 40));
    }

    #[test]
    fn crop_outside_image_is_none() {
        let trace = GuideTrace::new(vec![Point::new(500.0, 500.0)], 4);
        assert!(CropRegion::around_trace(&trace, 50, 40, 10).is_none());
    }
}
