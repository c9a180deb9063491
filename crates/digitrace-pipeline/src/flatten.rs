//! Flattening of raw vector paths into point sequences.
//!
//! Curves are split by recursive de Casteljau subdivision until their
//! control points lie within `tolerance` of the chord, or until
//! `max_depth` levels of subdivision have been spent on one segment.
//! Every element of a path, including a second `MoveTo`, contributes to
//! a single point sequence.

use kurbo::{CubicBez, ParamCurve, PathEl, QuadBez};

use crate::types::{Point, RawPath};

/// Flatten a raw path into its ordered point sequence.
///
/// Straight segments contribute their end point only; `ClosePath`
/// contributes the start of the current subpath when the pen is not
/// already there.
#[must_use = "returns the flattened points"]
pub fn flatten(path: &RawPath, tolerance: f64, max_depth: u32) -> Vec<Point> {
    let tol_sq = tolerance * tolerance;
    let mut out: Vec<Point> = Vec::new();
    let mut start = kurbo::Point::ZERO;
    let mut current = kurbo::Point::ZERO;

    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                out.push(p.into());
                start = p;
                current = p;
            }
            PathEl::LineTo(p) => {
                if out.is_empty() {
                    out.push(current.into());
                }
                out.push(p.into());
                current = p;
            }
            PathEl::QuadTo(p1, p2) => {
                if out.is_empty() {
                    out.push(current.into());
                }
                flatten_quad(QuadBez::new(current, p1, p2), tol_sq, max_depth, &mut out);
                current = p2;
            }
            PathEl::CurveTo(p1, p2, p3) => {
                if out.is_empty() {
                    out.push(current.into());
                }
                flatten_cubic(
                    CubicBez::new(current, p1, p2, p3),
                    tol_sq,
                    max_depth,
                    &mut out,
                );
                current = p3;
            }
            PathEl::ClosePath => {
                if current != start {
                    out.push(start.into());
                }
                current = start;
            }
        }
    }

    out
}

/// Total length of a polyline: the sum of its segment lengths.
#[must_use]
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

fn flatten_quad(q: QuadBez, tol_sq: f64, depth: u32, out: &mut Vec<Point>) {
    if depth == 0 || segment_distance_sq(q.p1, q.p0, q.p2) <= tol_sq {
        out.push(q.p2.into());
        return;
    }
    let (left, right) = q.subdivide();
    flatten_quad(left, tol_sq, depth - 1, out);
    flatten_quad(right, tol_sq, depth - 1, out);
}

fn flatten_cubic(c: CubicBez, tol_sq: f64, depth: u32, out: &mut Vec<Point>) {
    let flatness_sq =
        segment_distance_sq(c.p1, c.p0, c.p3).max(segment_distance_sq(c.p2, c.p0, c.p3));
    if depth == 0 || flatness_sq <= tol_sq {
        out.push(c.p3.into());
        return;
    }
    let (left, right) = c.subdivide();
    flatten_cubic(left, tol_sq, depth - 1, out);
    flatten_cubic(right, tol_sq, depth - 1, out);
}

/// Squared distance from `p` to the segment `a`–`b`.
fn segment_distance_sq(p: kurbo::Point, a: kurbo::Point, b: kurbo::Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq == 0.0 {
        return (p - a).hypot2();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).hypot2()
}

#[cfg(test)]
mod tests {
    use kurbo::{BezPath, ParamCurveNearest};

    use super::*;

    #[test]
    fn empty_path_has_no_points() {
        assert!(flatten(&BezPath::new(), 1.0, 8).is_empty());
    }

    #[test]
    fn polyline_keeps_its_vertices() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((3.0, 0.0));
        path.line_to((3.0, 4.0));
        let points = flatten(&path, 1.0, 8);
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 0.0),
                Point::new(3.0, 0.0),
                Point::new(3.0, 4.0)
            ]
        );
        assert!((polyline_length(&points) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn close_path_returns_to_start() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((2.0, 0.0));
        path.line_to((2.0, 2.0));
        path.close_path();
        let points = flatten(&path, 1.0, 8);
        assert_eq!(points.last(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn cubic_stays_within_tolerance() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.curve_to((0.0, 50.0), (100.0, 50.0), (100.0, 0.0));
        let points = flatten(&path, 1.0, 8);
        assert!(points.len() > 4, "curve should be subdivided");
        assert_eq!(points.first(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(points.last(), Some(&Point::new(100.0, 0.0)));

        // Every flattened vertex lies on the curve.
        let cubic = CubicBez::new((0.0, 0.0), (0.0, 50.0), (100.0, 50.0), (100.0, 0.0));
        for p in &points {
            let nearest = cubic.nearest(kurbo::Point::new(p.x, p.y), 1e-6);
            assert!(nearest.distance_sq < 1e-4);
        }
    }

    #[test]
    fn depth_limit_caps_subdivision() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.curve_to((0.0, 5000.0), (10000.0, 5000.0), (10000.0, 0.0));
        let points = flatten(&path, 1e-9, 3);
        // 2^3 pieces plus the start point.
        assert_eq!(points.len(), 9);
    }

    #[test]
    fn quad_is_flattened() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.quad_to((50.0, 100.0), (100.0, 0.0));
        let points = flatten(&path, 1.0, 8);
        assert!(points.len() > 3);
        assert_eq!(points.last(), Some(&Point::new(100.0, 0.0)));
    }
}
