//! Shared types for the digitrace path-extraction pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can hand images to a
/// [`Vectorizer`](crate::Vectorizer) without depending on `image` directly.
pub use image::GrayImage;

/// A raw vector path as produced by a vectorizer: any mix of lines,
/// quadratic and cubic Béziers. Flattened once before analysis.
pub type RawPath = kurbo::BezPath;

/// A 2D point in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Point shifted by `(dx, dy)`.
    #[must_use]
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Whether both coordinates are bit-for-bit identical.
    ///
    /// Stricter than `==`: distinguishes `0.0` from `-0.0`.
    #[must_use]
    pub const fn bit_eq(self, other: Self) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl From<kurbo::Point> for Point {
    fn from(p: kurbo::Point) -> Self {
        Self::new(p.x, p.y)
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// The rough guide line traced by the user with a virtual pen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideTrace {
    /// Pen positions in the order they were traced.
    pub points: Vec<Point>,
    /// Diameter of the pen in pixels.
    pub pen_width: u32,
}

impl GuideTrace {
    /// Create a new guide trace.
    #[must_use]
    pub const fn new(points: Vec<Point>, pen_width: u32) -> Self {
        Self { points, pen_width }
    }

    /// The same trace with every point shifted by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            points: self.points.iter().map(|p| p.translate(dx, dy)).collect(),
            pen_width: self.pen_width,
        }
    }

    /// Check the trace can be turned into a corridor.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::InvalidTrace`] if the trace has no points,
    /// has a zero pen width, or contains non-finite coordinates.
    pub fn validate(&self) -> Result<(), DigitizeError> {
        if self.points.is_empty() {
            return Err(DigitizeError::InvalidTrace("guide trace has no points".into()));
        }
        if self.pen_width == 0 {
            return Err(DigitizeError::InvalidTrace("pen width must be at least 1".into()));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(DigitizeError::InvalidTrace(
                "guide trace contains non-finite coordinates".into(),
            ));
        }
        Ok(())
    }
}

/// Final pipeline output: points sorted by ascending x with consecutive
/// duplicates removed.
///
/// An empty value is the "no matching line found" outcome, which is a
/// successful run, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitizedPoints(Vec<Point>);

impl DigitizedPoints {
    /// Wrap an already sorted, deduplicated point list.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if no line was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of digitized points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the result and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// Configuration for the digitizing pipeline.
///
/// Distances are in pixels, angles in degrees. Defaults match the
/// constants the digitizer was tuned with; see the `DEFAULT_*`
/// associated constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitizeConfig {
    /// Paths with a flattened length below this are treated as specks,
    /// not lines, and dropped first. Negative values behave as `0.0`.
    pub min_length: f64,

    /// Closest a neighbor may be to a corner candidate (IPAN99 `dmin`).
    pub corner_min_distance: f64,

    /// Farthest a neighbor may be from a corner candidate (IPAN99 `dmax`).
    pub corner_max_distance: f64,

    /// Widest interior angle that still counts as a corner (IPAN99 `amax`).
    pub corner_max_angle_deg: f64,

    /// Partially-inside paths are kept only when more than this fraction
    /// of their length lies inside the trace corridor.
    pub inside_fraction: f64,

    /// Paths whose line-fit sigma is at most this are "straight" and get
    /// checked for being perpendicular to the trace.
    pub straightness_sigma: f64,

    /// Straight paths within this angle of the local trace direction are
    /// parallel and kept.
    pub parallel_tolerance_deg: f64,

    /// Maximum distance between a Bézier and its flattened polyline.
    pub flatten_tolerance: f64,

    /// Maximum recursive subdivisions per curve segment when flattening.
    pub flatten_depth: u32,

    /// Truncate output coordinates to whole pixels before removing
    /// duplicates.
    pub snap_to_pixels: bool,

    /// The vectorizer reports y-up coordinates (e.g. PDF space); flip them
    /// into image space before analysis.
    pub flip_vertical: bool,

    /// Crop the image to the trace before vectorizing, widening the crop
    /// vertically by this many pixels. `None` vectorizes the whole image.
    pub crop_margin: Option<u32>,

    /// Luminance below which a pixel counts as ink for the built-in
    /// [`ContourVectorizer`](crate::ContourVectorizer).
    pub ink_threshold: u8,
}

impl DigitizeConfig {
    /// Default minimum line length in pixels.
    pub const DEFAULT_MIN_LENGTH: f64 = 6.0;
    /// Default IPAN99 minimum neighbor distance in pixels.
    pub const DEFAULT_CORNER_MIN_DISTANCE: f64 = 4.0;
    /// Default IPAN99 maximum neighbor distance in pixels.
    pub const DEFAULT_CORNER_MAX_DISTANCE: f64 = 7.0;
    /// Default IPAN99 maximum corner angle in degrees.
    pub const DEFAULT_CORNER_MAX_ANGLE_DEG: f64 = 160.0;
    /// Default inside-corridor fraction for outlier removal.
    pub const DEFAULT_INSIDE_FRACTION: f64 = 0.75;
    /// Default straightness limit on line-fit sigma.
    pub const DEFAULT_STRAIGHTNESS_SIGMA: f64 = 20.0;
    /// Default parallel tolerance in degrees.
    pub const DEFAULT_PARALLEL_TOLERANCE_DEG: f64 = 15.0;
    /// Default flattening tolerance in pixels.
    pub const DEFAULT_FLATTEN_TOLERANCE: f64 = 1.0;
    /// Default flattening recursion limit.
    pub const DEFAULT_FLATTEN_DEPTH: u32 = 8;
    /// Deepest flattening recursion accepted; each level can double the
    /// work per curve segment.
    pub const MAX_FLATTEN_DEPTH: u32 = 16;
    /// Default vertical crop margin in pixels.
    pub const DEFAULT_CROP_MARGIN: u32 = 80;
    /// Default ink threshold (mid-gray).
    pub const DEFAULT_INK_THRESHOLD: u8 = 128;
    /// Default pen width offered to callers, in pixels.
    pub const DEFAULT_PEN_WIDTH: u32 = 40;

    /// Squared IPAN99 minimum neighbor distance.
    #[must_use]
    pub fn corner_min_distance_sq(&self) -> f64 {
        self.corner_min_distance * self.corner_min_distance
    }

    /// Squared IPAN99 maximum neighbor distance.
    #[must_use]
    pub fn corner_max_distance_sq(&self) -> f64 {
        self.corner_max_distance * self.corner_max_distance
    }

    /// IPAN99 maximum corner angle in radians.
    #[must_use]
    pub fn corner_max_angle(&self) -> f64 {
        self.corner_max_angle_deg.to_radians()
    }

    /// Parallel tolerance in radians.
    #[must_use]
    pub fn parallel_tolerance(&self) -> f64 {
        self.parallel_tolerance_deg.to_radians()
    }

    /// Minimum line length with negative values clamped to zero.
    #[must_use]
    pub fn effective_min_length(&self) -> f64 {
        self.min_length.max(0.0)
    }

    /// Check that every tolerance is usable.
    ///
    /// # Errors
    ///
    /// Returns [`DigitizeError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), DigitizeError> {
        let finite_non_negative = [
            ("min_length", self.min_length.max(0.0)),
            ("corner_min_distance", self.corner_min_distance),
            ("corner_max_distance", self.corner_max_distance),
            ("corner_max_angle_deg", self.corner_max_angle_deg),
            ("straightness_sigma", self.straightness_sigma),
            ("parallel_tolerance_deg", self.parallel_tolerance_deg),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DigitizeError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.corner_min_distance > self.corner_max_distance {
            return Err(DigitizeError::InvalidConfig(format!(
                "corner_min_distance ({}) exceeds corner_max_distance ({})",
                self.corner_min_distance, self.corner_max_distance
            )));
        }
        if !(0.0..=1.0).contains(&self.inside_fraction) {
            return Err(DigitizeError::InvalidConfig(format!(
                "inside_fraction must be within [0, 1], got {}",
                self.inside_fraction
            )));
        }
        if !self.flatten_tolerance.is_finite() || self.flatten_tolerance <= 0.0 {
            return Err(DigitizeError::InvalidConfig(format!(
                "flatten_tolerance must be finite and positive, got {}",
                self.flatten_tolerance
            )));
        }
        if self.flatten_depth > Self::MAX_FLATTEN_DEPTH {
            return Err(DigitizeError::InvalidConfig(format!(
                "flatten_depth must be at most {}, got {}",
                Self::MAX_FLATTEN_DEPTH,
                self.flatten_depth
            )));
        }
        Ok(())
    }
}

impl Default for DigitizeConfig {
    fn default() -> Self {
        Self {
            min_length: Self::DEFAULT_MIN_LENGTH,
            corner_min_distance: Self::DEFAULT_CORNER_MIN_DISTANCE,
            corner_max_distance: Self::DEFAULT_CORNER_MAX_DISTANCE,
            corner_max_angle_deg: Self::DEFAULT_CORNER_MAX_ANGLE_DEG,
            inside_fraction: Self::DEFAULT_INSIDE_FRACTION,
            straightness_sigma: Self::DEFAULT_STRAIGHTNESS_SIGMA,
            parallel_tolerance_deg: Self::DEFAULT_PARALLEL_TOLERANCE_DEG,
            flatten_tolerance: Self::DEFAULT_FLATTEN_TOLERANCE,
            flatten_depth: Self::DEFAULT_FLATTEN_DEPTH,
            snap_to_pixels: false,
            flip_vertical: false,
            crop_margin: Some(Self::DEFAULT_CROP_MARGIN),
            ink_threshold: Self::DEFAULT_INK_THRESHOLD,
        }
    }
}

/// Errors that can occur while digitizing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum DigitizeError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Pipeline configuration is invalid.
    #[error("invalid digitize configuration: {0}")]
    InvalidConfig(String),

    /// The guide trace cannot be turned into a corridor.
    #[error("invalid guide trace: {0}")]
    InvalidTrace(String),

    /// The vectorizer could not be run or reported a failure.
    #[error("vectorization failed: {0}")]
    Vectorizer(String),

    /// The run was cancelled before it completed.
    #[error("digitizing was cancelled")]
    Cancelled,

    /// The background worker could not be started or died mid-run.
    #[error("digitizing worker failed: {0}")]
    Worker(String),
}

/// Serde-compatible proxy for `DigitizeError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum DigitizeErrorProxy {
    EmptyInput,
    ImageDecode(String),
    InvalidConfig(String),
    InvalidTrace(String),
    Vectorizer(String),
    Cancelled,
    Worker(String),
}

impl Serialize for DigitizeError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => DigitizeErrorProxy::EmptyInput,
            Self::ImageDecode(e) => DigitizeErrorProxy::ImageDecode(e.to_string()),
            Self::InvalidConfig(s) => DigitizeErrorProxy::InvalidConfig(s.clone()),
            Self::InvalidTrace(s) => DigitizeErrorProxy::InvalidTrace(s.clone()),
            Self::Vectorizer(s) => DigitizeErrorProxy::Vectorizer(s.clone()),
            Self::Cancelled => DigitizeErrorProxy::Cancelled,
            Self::Worker(s) => DigitizeErrorProxy::Worker(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DigitizeError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = DigitizeErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            DigitizeErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            DigitizeErrorProxy::EmptyInput => Self::EmptyInput,
            DigitizeErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            DigitizeErrorProxy::InvalidTrace(s) => Self::InvalidTrace(s),
            DigitizeErrorProxy::Vectorizer(s) => Self::Vectorizer(s),
            DigitizeErrorProxy::Cancelled => Self::Cancelled,
            DigitizeErrorProxy::Worker(s) => Self::Worker(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance_squared() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_bit_eq_distinguishes_signed_zero() {
        assert!(Point::new(1.0, 2.0).bit_eq(Point::new(1.0, 2.0)));
        assert!(!Point::new(0.0, 2.0).bit_eq(Point::new(-0.0, 2.0)));
        assert_eq!(Point::new(0.0, 2.0), Point::new(-0.0, 2.0));
    }

    #[test]
    fn point_from_kurbo() {
        let p: Point = kurbo::Point::new(1.5, -2.0).into();
        assert_eq!(p, Point::new(1.5, -2.0));
    }

    // --- GuideTrace tests ---

    #[test]
    fn trace_translated_keeps_pen_width() {
        let trace = GuideTrace::new(vec![Point::new(10.0, 20.0)], 8);
        let moved = trace.translated(-10.0, 5.0);
        assert_eq!(moved.points, vec![Point::new(0.0, 25.0)]);
        assert_eq!(moved.pen_width, 8);
    }

    #[test]
    fn trace_validation() {
        assert!(GuideTrace::new(vec![], 4).validate().is_err());
        assert!(
            GuideTrace::new(vec![Point::new(0.0, 0.0)], 0)
                .validate()
                .is_err()
        );
        assert!(
            GuideTrace::new(vec![Point::new(f64::NAN, 0.0)], 4)
                .validate()
                .is_err()
        );
        assert!(
            GuideTrace::new(vec![Point::new(0.0, 0.0)], 4)
                .validate()
                .is_ok()
        );
    }

    // --- DigitizeConfig tests ---

    #[test]
    fn config_defaults() {
        let config = DigitizeConfig::default();
        assert!((config.min_length - 6.0).abs() < f64::EPSILON);
        assert!((config.corner_min_distance_sq() - 16.0).abs() < f64::EPSILON);
        assert!((config.corner_max_distance_sq() - 49.0).abs() < f64::EPSILON);
        assert!((config.corner_max_angle() - 160.0_f64.to_radians()).abs() < 1e-12);
        assert!((config.inside_fraction - 0.75).abs() < f64::EPSILON);
        assert!((config.straightness_sigma - 20.0).abs() < f64::EPSILON);
        assert!((config.parallel_tolerance_deg - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.flatten_depth, 8);
        assert!(!config.snap_to_pixels);
        assert!(!config.flip_vertical);
        assert_eq!(config.crop_margin, Some(80));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_min_length_clamps_to_zero() {
        let config = DigitizeConfig {
            min_length: -3.0,
            ..DigitizeConfig::default()
        };
        assert!(config.effective_min_length().abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validation_rejects_inverted_corner_distances() {
        let config = DigitizeConfig {
            corner_min_distance: 8.0,
            corner_max_distance: 7.0,
            ..DigitizeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DigitizeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_validation_rejects_fraction_out_of_range() {
        let config = DigitizeConfig {
            inside_fraction: 1.5,
            ..DigitizeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validation_caps_flatten_depth() {
        let at_cap = DigitizeConfig {
            flatten_depth: DigitizeConfig::MAX_FLATTEN_DEPTH,
            ..DigitizeConfig::default()
        };
        assert!(at_cap.validate().is_ok());
        let too_deep = DigitizeConfig {
            flatten_depth: 64,
            flatten_tolerance: 1e-9,
            ..DigitizeConfig::default()
        };
        assert!(matches!(
            too_deep.validate(),
            Err(DigitizeError::InvalidConfig(msg)) if msg.contains("flatten_depth")
        ));
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: DigitizeConfig = serde_json::from_str(r#"{"min_length": 2.5}"#).unwrap();
        assert!((config.min_length - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.crop_margin, Some(80));
    }

    // --- DigitizeError tests ---

    #[test]
    fn error_display() {
        assert_eq!(
            DigitizeError::Cancelled.to_string(),
            "digitizing was cancelled"
        );
        assert_eq!(
            DigitizeError::Vectorizer("tool not found".into()).to_string(),
            "vectorization failed: tool not found",
        );
    }

    #[test]
    fn error_serde_keeps_variant() {
        let json = serde_json::to_string(&DigitizeError::Vectorizer("boom".into())).unwrap();
        let back: DigitizeError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, DigitizeError::Vectorizer(ref s) if s == "boom"));
    }
}
