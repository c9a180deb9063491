//! Segment joining: merge the surviving paths into one left-to-right
//! point list.
//!
//! The paths are concatenated in the order they survived filtering, the
//! combined list is stably sorted by x, and consecutive duplicates are
//! dropped. Duplicates separated by a point with a different x are
//! kept.

use std::cmp::Ordering;

use crate::types::{DigitizedPoints, Point};

/// Concatenate the points of every path, in list order.
#[must_use]
pub fn concatenate<P: AsRef<[Point]>>(paths: &[P]) -> Vec<Point> {
    let total: usize = paths.iter().map(|p| p.as_ref().len()).sum();
    let mut points = Vec::with_capacity(total);
    for path in paths {
        points.extend_from_slice(path.as_ref());
    }
    points
}

/// Sort points by ascending x, leaving equal-x points in input order.
///
/// `0.0` and `-0.0` compare equal, as do incomparable (NaN) values.
pub fn sort_by_x(points: &mut [Point]) {
    points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
}

/// Truncate both coordinates of every point toward zero.
pub fn snap_to_pixels(points: &mut [Point]) {
    for p in points {
        *p = Point::new(p.x.trunc(), p.y.trunc());
    }
}

/// Drop points bit-identical to their predecessor.
pub fn dedup_consecutive(points: &mut Vec<Point>) {
    points.dedup_by(|b, a| a.bit_eq(*b));
}

/// Join surviving paths into the final output.
///
/// With `snap` the coordinates are truncated to whole pixels after
/// sorting, so points landing on the same pixel collapse.
#[must_use]
pub fn join<P: AsRef<[Point]>>(paths: &[P], snap: bool) -> DigitizedPoints {
    let mut points = concatenate(paths);
    sort_by_x(&mut points);
    if snap {
        snap_to_pixels(&mut points);
    }
    dedup_consecutive(&mut points);
    DigitizedPoints::new(points)
}
