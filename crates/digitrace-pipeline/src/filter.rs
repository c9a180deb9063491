//! The five filter stages that whittle the vectorizer's paths down to
//! the ones making up the traced curve.
//!
//! Every stage consumes the current list of [`PathRecord`]s and returns
//! the survivors. Survivors keep their relative order; paths created by
//! corner splitting are appended after the untouched ones.

use serde::{Deserialize, Serialize};

use crate::corners::{CornerTolerances, split_at_corners};
use crate::corridor::TraceCorridor;
use crate::fit::{OrientedFit, Scratch, angle_between_lines, fit_oriented};
use crate::record::PathRecord;
use crate::types::{DigitizeConfig, Point};

/// One of the filter stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Drop specks shorter than the minimum line length.
    ShortSegments,
    /// Cut paths at their corners.
    Corners,
    /// Drop paths that never enter the corridor.
    NonIntersecting,
    /// Drop paths that mostly run outside the corridor.
    Outliers,
    /// Drop straight paths that cross the trace at an angle.
    Perpendiculars,
}

impl FilterStage {
    /// Every stage, in execution order.
    pub const ALL: [Self; 5] = [
        Self::ShortSegments,
        Self::Corners,
        Self::NonIntersecting,
        Self::Outliers,
        Self::Perpendiculars,
    ];

    /// Short lowercase name used in logs and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ShortSegments => "short_segments",
            Self::Corners => "corners",
            Self::NonIntersecting => "non_intersecting",
            Self::Outliers => "outliers",
            Self::Perpendiculars => "perpendiculars",
        }
    }

    /// Human-readable label for reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ShortSegments => "Short Segments",
            Self::Corners => "Corner Splitting",
            Self::NonIntersecting => "Non-intersecting",
            Self::Outliers => "Outliers",
            Self::Perpendiculars => "Perpendiculars",
        }
    }

    /// Zero-based position in [`ALL`](Self::ALL).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Run this stage.
    #[must_use]
    pub fn apply(self, records: Vec<PathRecord>, ctx: &mut FilterContext<'_>) -> Vec<PathRecord> {
        let before = records.len();
        let out = match self {
            Self::ShortSegments => remove_short_paths(records, ctx.config.effective_min_length()),
            Self::Corners => split_corners(
                records,
                &CornerTolerances::from_config(ctx.config),
                ctx.scratch,
            ),
            Self::NonIntersecting => remove_non_intersecting(records, ctx.corridor),
            Self::Outliers => remove_outliers(records, ctx.corridor, ctx.config.inside_fraction),
            Self::Perpendiculars => {
                remove_perpendiculars(records, ctx.corridor, ctx.config, ctx.scratch)
            }
        };
        log::debug!("{}: {before} -> {} paths", self.name(), out.len());
        out
    }
}

/// Everything the stages read besides the path list.
#[derive(Debug)]
pub struct FilterContext<'a> {
    /// Tolerances.
    pub config: &'a DigitizeConfig,
    /// Corridor around the guide trace.
    pub corridor: &'a TraceCorridor,
    /// Line-fit buffers shared by record construction and stage 5.
    pub scratch: &'a mut Scratch,
}

/// Stage 1: drop paths shorter than `min_length`.
#[must_use]
pub fn remove_short_paths(records: Vec<PathRecord>, min_length: f64) -> Vec<PathRecord> {
    let min_sq = min_length * min_length;
    records
        .into_iter()
        .filter(|r| r.length() * r.length() >= min_sq)
        .collect()
}

/// Stage 2: replace every path that has corners with its pieces.
///
/// Pieces go to the end of the list, in path order.
#[must_use]
pub fn split_corners(
    records: Vec<PathRecord>,
    tol: &CornerTolerances,
    scratch: &mut Scratch,
) -> Vec<PathRecord> {
    let mut kept = Vec::with_capacity(records.len());
    let mut pieces = Vec::new();
    for record in records {
        match split_at_corners(record.points(), tol) {
            Some(parts) => {
                pieces.extend(parts.into_iter().map(|p| PathRecord::new(p, scratch)));
            }
            None => kept.push(record),
        }
    }
    kept.append(&mut pieces);
    kept
}

/// Stage 3: drop paths with no point inside the corridor.
///
/// Paths whose bounding box misses the corridor's are rejected without
/// testing individual points.
#[must_use]
pub fn remove_non_intersecting(
    records: Vec<PathRecord>,
    corridor: &TraceCorridor,
) -> Vec<PathRecord> {
    records
        .into_iter()
        .filter(|r| {
            corridor.bounds_overlap(&r.bounds())
                && r.points().iter().any(|p| corridor.contains(*p))
        })
        .collect()
}

/// Stage 4: drop paths that run mostly outside the corridor.
///
/// Paths lying wholly inside the corridor are kept. Any other path is
/// kept only when more than `inside_fraction` of its length is inside.
#[must_use]
pub fn remove_outliers(
    records: Vec<PathRecord>,
    corridor: &TraceCorridor,
    inside_fraction: f64,
) -> Vec<PathRecord> {
    records
        .into_iter()
        .filter(|r| {
            if fully_inside(r.points(), corridor) {
                return true;
            }
            let length = r.length();
            let fraction = if length > 0.0 {
                corridor.inside_length(r.points()) / length
            } else {
                0.0
            };
            fraction > inside_fraction
        })
        .collect()
}

/// Stage 5: drop straight paths that cross the trace at an angle.
///
/// Only paths that are straight (two points, or a line-fit sigma within
/// `straightness_sigma`) and not wholly inside the corridor are judged.
/// A judged path survives when it runs parallel to the trace near its
/// end points.
#[must_use]
pub fn remove_perpendiculars(
    records: Vec<PathRecord>,
    corridor: &TraceCorridor,
    config: &DigitizeConfig,
    scratch: &mut Scratch,
) -> Vec<PathRecord> {
    let tolerance = config.parallel_tolerance();
    records
        .into_iter()
        .filter(|r| {
            let curved = r.len() > 2 && r.sigma().is_some_and(|s| s > config.straightness_sigma);
            if curved || fully_inside(r.points(), corridor) {
                return true;
            }
            runs_along_trace(r, corridor.trace(), tolerance, scratch)
        })
        .collect()
}

fn fully_inside(points: &[Point], corridor: &TraceCorridor) -> bool {
    points.iter().all(|p| corridor.contains(*p))
}

/// Whether a straight path is parallel to the trace where it meets it.
fn runs_along_trace(
    record: &PathRecord,
    trace: &[Point],
    tolerance: f64,
    scratch: &mut Scratch,
) -> bool {
    let (first, last) = record.endpoints();
    let (Some(i1), Some(i2)) = (nearest_index(trace, first), nearest_index(trace, last)) else {
        return true;
    };
    let (lo, hi) = trace_window(trace.len(), i1, i2);
    let window = &trace[lo..=hi];
    if window.len() < 2 {
        return true;
    }

    let local = fit_oriented(window, scratch);
    let path = record.oriented_fit();
    if path.vertical {
        return local.vertical;
    }
    parallel(path, local, tolerance)
}

fn parallel(path: OrientedFit, trace: OrientedFit, tolerance: f64) -> bool {
    let angle = angle_between_lines(path.direction(), trace.direction());
    // A degenerate trace window gives no direction to compare against.
    angle.is_nan() || angle < tolerance
}

/// Index of the trace point nearest to `p`; the first on ties.
fn nearest_index(trace: &[Point], p: Point) -> Option<usize> {
    trace
        .iter()
        .map(|q| q.distance_squared(p))
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Inclusive index range of the trace sample between `i1` and `i2`,
/// widened to at least 3 points where the trace allows.
fn trace_window(len: usize, i1: usize, i2: usize) -> (usize, usize) {
    let (mut lo, mut hi) = (i1.min(i2), i1.max(i2));
    if hi - lo < 2 {
        if lo == 0 {
            hi += 2;
        } else {
            lo -= 1;
            hi += 1;
        }
        let last = len.saturating_sub(1);
        if hi > last {
            lo = lo.saturating_sub(hi - last);
            hi = last;
        }
    }
    (lo, hi)
}
