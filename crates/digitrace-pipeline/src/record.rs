//! Path records: a flattened path with its precomputed statistics.
//!
//! Every later stage works on [`PathRecord`]s. A record is built once
//! from a point sequence and replaced, never mutated, when its path is
//! split.

use crate::fit::{LineFit, OrientedFit, Scratch, fit_oriented};
use crate::flatten::polyline_length;
use crate::types::Point;

/// A flattened path plus its length, line fit and straightness.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRecord {
    points: Vec<Point>,
    length: f64,
    fit: OrientedFit,
    sigma: Option<f64>,
}

impl PathRecord {
    /// Analyze a flattened point sequence.
    ///
    /// # Panics
    ///
    /// Panics if `points` holds fewer than 2 points; single points are
    /// not paths and are removed before records are built.
    #[must_use]
    pub fn new(points: Vec<Point>, scratch: &mut Scratch) -> Self {
        let length = polyline_length(&points);
        let fit = fit_oriented(&points, scratch);
        let sigma = (points.len() > 2).then(|| {
            #[allow(clippy::cast_precision_loss)]
            let dof = (points.len() - 2) as f64;
            (fit.fit.chi2 / dof).sqrt()
        });
        Self {
            points,
            length,
            fit,
            sigma,
        }
    }

    /// The flattened points, in path order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Consumes the record and returns its points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Number of flattened points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`: a record holds at least 2 points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the segment lengths.
    #[must_use]
    pub const fn length(&self) -> f64 {
        self.length
    }

    /// The least-squares line through the points.
    ///
    /// Expresses x as a function of y when [`is_vertical`](Self::is_vertical)
    /// is `true`, y as a function of x otherwise.
    #[must_use]
    pub const fn line_fit(&self) -> LineFit {
        self.fit.fit
    }

    /// Line fit together with its orientation.
    #[must_use]
    pub const fn oriented_fit(&self) -> OrientedFit {
        self.fit
    }

    /// Whether the path runs mostly vertically.
    #[must_use]
    pub const fn is_vertical(&self) -> bool {
        self.fit.vertical
    }

    /// RMS residual of the line fit, `sqrt(chi2 / (n - 2))`.
    ///
    /// `None` for two-point paths, which have no meaningful residual.
    #[must_use]
    pub const fn sigma(&self) -> Option<f64> {
        self.sigma
    }

    /// First and last point.
    #[must_use]
    pub fn endpoints(&self) -> (Point, Point) {
        (self.points[0], self.points[self.points.len() - 1])
    }

    /// Axis-aligned bounding box of the points.
    #[must_use]
    pub fn bounds(&self) -> geo::Rect<f64> {
        let (min, max) = self.points.iter().fold(
            (
                Point::new(f64::INFINITY, f64::INFINITY),
                Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(lo, hi), p| {
                (
                    Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::new(hi.x.max(p.x), hi.y.max(p.y)),
                )
            },
        );
        geo::Rect::new(min, max)
    }
}

impl AsRef<[Point]> for PathRecord {
    fn as_ref(&self) -> &[Point] {
        &self.points
    }
}

/// Build one record per point sequence.
///
/// Sequences of fewer than 2 points are single specks with no extent
/// and are dropped.
#[must_use]
pub fn build_records(paths: Vec<Vec<Point>>, scratch: &mut Scratch) -> Vec<PathRecord> {
    let total = paths.len();
    let records: Vec<PathRecord> = paths
        .into_iter()
        .filter(|points| points.len() >= 2)
        .map(|points| PathRecord::new(points, scratch))
        .collect();
    if records.len() < total {
        log::debug!("dropped {} single-point paths", total - records.len());
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_horizontal_record() {
        let points: Vec<Point> = (0..10).map(|i| Point::new(f64::from(i), 2.0)).collect();
        let record = PathRecord::new(points, &mut Scratch::new());
        assert_eq!(record.len(), 10);
        assert!((record.length() - 9.0).abs() < 1e-12);
        assert!(!record.is_vertical());
        assert!(record.line_fit().slope.abs() < 1e-12);
        assert!(record.sigma().unwrap_or(f64::NAN).abs() < 1e-12);
    }

    #[test]
    fn two_point_record_has_no_sigma() {
        let record = PathRecord::new(
            vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0)],
            &mut Scratch::new(),
        );
        assert!(record.sigma().is_none());
        assert!((record.length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn sigma_measures_scatter() {
        // Alternating +-1 about y = 0: chi2 = 6, dof = 4.
        let points = vec![
            Point::new(0.0, 1.0),
            Point::new(1.0, -1.0),
            Point::new(2.0, 1.0),
            Point::new(3.0, -1.0),
            Point::new(4.0, 1.0),
            Point::new(5.0, -1.0),
        ];
        let record = PathRecord::new(points, &mut Scratch::new());
        let sigma = record.sigma().unwrap_or(f64::NAN);
        assert!(sigma > 0.9 && sigma < 1.1, "sigma = {sigma}");
    }

    #[test]
    fn vertical_record_fits_x_of_y() {
        let points: Vec<Point> = (0..6).map(|i| Point::new(7.0, f64::from(i) * 2.0)).collect();
        let record = PathRecord::new(points, &mut Scratch::new());
        assert!(record.is_vertical());
        assert!((record.line_fit().intercept - 7.0).abs() < 1e-12);
    }

    #[test]
    fn build_records_skips_single_points() {
        let records = build_records(
            vec![
                vec![Point::new(1.0, 1.0)],
                vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
                vec![],
            ],
            &mut Scratch::new(),
        );
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn bounds_cover_all_points() {
        let record = PathRecord::new(
            vec![
                Point::new(2.0, 5.0),
                Point::new(-1.0, 3.0),
                Point::new(4.0, 8.0),
            ],
            &mut Scratch::new(),
        );
        let bounds = record.bounds();
        assert!((bounds.min().x + 1.0).abs() < f64::EPSILON);
        assert!((bounds.min().y - 3.0).abs() < f64::EPSILON);
        assert!((bounds.max().x - 4.0).abs() < f64::EPSILON);
        assert!((bounds.max().y - 8.0).abs() < f64::EPSILON);
    }
}
