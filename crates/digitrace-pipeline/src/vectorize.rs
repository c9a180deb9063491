//! Vectorization: turning the raster image into raw paths.
//!
//! The pipeline does not care how paths are produced. [`Vectorizer`] is
//! the seam: an external tracing program wrapped in a closure, a list of
//! paths computed earlier, or the built-in [`ContourVectorizer`].

use image::GrayImage;
use kurbo::BezPath;

use crate::raster::binarize;
use crate::types::{DigitizeConfig, DigitizeError, RawPath};

/// Produces raw vector paths from a grayscale image.
pub trait Vectorizer {
    /// Vectorize `image`. Coordinates are in the image's pixel space
    /// (or y-up, see [`DigitizeConfig::flip_vertical`]).
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::Vectorizer`] when the underlying tool is
    /// missing or fails.
    fn vectorize(&self, image: &GrayImage) -> Result<Vec<RawPath>, DigitizeError>;
}

impl<F> Vectorizer for F
where
    F: Fn(&GrayImage) -> Result<Vec<RawPath>, DigitizeError>,
{
    fn vectorize(&self, image: &GrayImage) -> Result<Vec<RawPath>, DigitizeError> {
        self(image)
    }
}

/// Paths vectorized ahead of time; the image is ignored.
impl Vectorizer for Vec<RawPath> {
    fn vectorize(&self, _image: &GrayImage) -> Result<Vec<RawPath>, DigitizeError> {
        Ok(self.clone())
    }
}

/// Built-in vectorizer: binarize, then follow the borders of every ink
/// region (Suzuki-Abe, via `imageproc::contours::find_contours`).
///
/// Each border becomes one polyline. Borders run around the ink, so a
/// thin line comes back as a loop hugging both of its sides; corner
/// splitting cuts such loops at their turning points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContourVectorizer {
    /// Luminance below which a pixel counts as ink.
    pub ink_threshold: u8,
}

impl ContourVectorizer {
    /// Use the ink threshold from `config`.
    #[must_use]
    pub const fn from_config(config: &DigitizeConfig) -> Self {
        Self {
            ink_threshold: config.ink_threshold,
        }
    }
}

impl Default for ContourVectorizer {
    fn default() -> Self {
        Self {
            ink_threshold: DigitizeConfig::DEFAULT_INK_THRESHOLD,
        }
    }
}

impl Vectorizer for ContourVectorizer {
    fn vectorize(&self, image: &GrayImage) -> Result<Vec<RawPath>, DigitizeError> {
        let ink = binarize(image, self.ink_threshold);
        let contours: Vec<imageproc::contours::Contour<u32>> =
            imageproc::contours::find_contours(&ink);

        let paths: Vec<RawPath> = contours
            .into_iter()
            .filter(|c| c.points.len() >= 2)
            .map(|c| {
                let mut path = BezPath::new();
                let mut points = c.points.iter();
                if let Some(first) = points.next() {
                    path.move_to((f64::from(first.x), f64::from(first.y)));
                }
                for p in points {
                    path.line_to((f64::from(p.x), f64::from(p.y)));
                }
                path
            })
            .collect();
        log::debug!("contour vectorizer found {} paths", paths.len());
        Ok(paths)
    }
}
