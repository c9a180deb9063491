//! Corner detection and splitting (IPAN99).
//!
//! Each interior point is the tip of a series of triangles whose legs
//! reach one more point along the path on each side, and is scored by
//! the sharpest qualifying opening angle. A candidate with a sharper
//! one less than `dmin` ahead of it is dropped. The path is cut at the
//! remaining corners so every piece is closer to a straight line.
//!
//! Reference: D. Chetverikov and Zs. Szabó, "A Simple and Efficient
//! Algorithm for Detection of High Curvature Points in Planar Curves",
//! 1999.

use std::f64::consts::PI;

use crate::types::{DigitizeConfig, Point};

/// Sharpness assigned to points that are not corners.
pub const NOT_A_CORNER: f64 = PI;

/// Distance and angle limits for the corner search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerTolerances {
    /// Squared minimum neighbor distance.
    pub min_distance_sq: f64,
    /// Squared maximum neighbor distance.
    pub max_distance_sq: f64,
    /// Widest angle, in radians, that still counts as a corner.
    pub max_angle: f64,
}

impl CornerTolerances {
    /// Take the corner limits from a pipeline configuration.
    #[must_use]
    pub fn from_config(config: &DigitizeConfig) -> Self {
        Self {
            min_distance_sq: config.corner_min_distance_sq(),
            max_distance_sq: config.corner_max_distance_sq(),
            max_angle: config.corner_max_angle(),
        }
    }
}

impl Default for CornerTolerances {
    fn default() -> Self {
        Self::from_config(&DigitizeConfig::default())
    }
}

/// Score every point of a path.
///
/// The result has one entry per point. Entries below [`NOT_A_CORNER`]
/// mark corners; end points are never corners.
#[must_use]
pub fn sharpness(points: &[Point], tol: &CornerTolerances) -> Vec<f64> {
    let n = points.len();
    let mut scores = vec![NOT_A_CORNER; n];
    if n <= 2 {
        return scores;
    }
    for (i, score) in scores.iter_mut().enumerate().take(n - 1).skip(1) {
        *score = sharpest_triangle(points, i, tol);
    }
    suppress_adjacent(points, &mut scores, tol.min_distance_sq);
    scores
}

/// Smallest qualifying opening angle of the triangles with their tip at
/// `points[ip]`.
///
/// The legs grow one point per side at a time, with the far end
/// clamped to the last point. The first triangle whose legs both exceed
/// `dmin` is accepted however long they are; later ones must also keep
/// both legs under `dmax`. The search ends at the first accepted
/// triangle wider than `max_angle`, once a leg reaches `dmax` after a
/// triangle has been accepted, or when the near end runs out of points.
fn sharpest_triangle(points: &[Point], ip: usize, tol: &CornerTolerances) -> f64 {
    let last = points.len() - 1;
    let p = points[ip];
    let (mut behind, mut ahead) = (ip - 1, ip + 1);
    let mut first = true;
    let mut best = NOT_A_CORNER;
    loop {
        let (pm, pp) = (points[behind], points[ahead]);
        let a2 = p.distance_squared(pp);
        let b2 = p.distance_squared(pm);
        let a_within = a2 < tol.max_distance_sq || first;
        let b_within = b2 < tol.max_distance_sq || first;

        if a2 > tol.min_distance_sq && b2 > tol.min_distance_sq && a_within && b_within {
            first = false;
            let angle = opening_angle((pp.x - p.x, pp.y - p.y), (pm.x - p.x, pm.y - p.y));
            if angle > tol.max_angle {
                break;
            }
            best = best.min(angle);
        }

        if !(a_within && b_within) || behind == 0 {
            break;
        }
        behind -= 1;
        ahead = (ahead + 1).min(last);
    }
    best
}

/// Clear candidates that have a sharper candidate just ahead of them.
///
/// Walking forward, each surviving candidate is compared with the
/// following points closer than `min_distance_sq`: a strictly sharper
/// one removes it, anything else is removed in its favor.
fn suppress_adjacent(points: &[Point], scores: &mut [f64], min_distance_sq: f64) {
    let last = points.len() - 1;
    for i in 1..last {
        let s = scores[i];
        if s >= NOT_A_CORNER {
            continue;
        }
        let p = points[i];
        for j in i + 1..last {
            if p.distance_squared(points[j]) >= min_distance_sq {
                break;
            }
            if scores[j] < s {
                scores[i] = NOT_A_CORNER;
                break;
            }
            scores[j] = NOT_A_CORNER;
        }
    }
}

/// Indices of the corners of a path, in ascending order.
#[must_use]
pub fn corner_indices(points: &[Point], tol: &CornerTolerances) -> Vec<usize> {
    sharpness(points, tol)
        .iter()
        .enumerate()
        .filter(|(_, s)| **s < NOT_A_CORNER)
        .map(|(i, _)| i)
        .collect()
}

/// Cut a path at its corners.
///
/// Consecutive pieces share the corner point: each piece ends at a
/// corner and the next one starts there. Returns `None` when the path
/// has no corners (including every path of 2 points or fewer).
#[must_use]
pub fn split_at_corners(points: &[Point], tol: &CornerTolerances) -> Option<Vec<Vec<Point>>> {
    let corners = corner_indices(points, tol);
    if corners.is_empty() {
        return None;
    }

    let mut pieces = Vec::with_capacity(corners.len() + 1);
    let mut start = 0;
    for &corner in &corners {
        pieces.push(points[start..=corner].to_vec());
        start = corner;
    }
    pieces.push(points[start..].to_vec());
    Some(pieces)
}

/// Angle between two vectors, in `[0, PI]`.
fn opening_angle(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dot = a.0.mul_add(b.0, a.1 * b.1);
    let norms = (a.0.hypot(a.1)) * (b.0.hypot(b.1));
    if norms == 0.0 {
        return NOT_A_CORNER;
    }
    (dot / norms).clamp(-1.0, 1.0).acos()
}
