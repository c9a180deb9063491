//! Least-squares straight-line fitting.
//!
//! Ordinary least squares on vertical residuals, `y(x) = a + b*x`
//! (Numerical Recipes, 2nd ed., §15.2, unweighted). Paths that run
//! mostly vertically are fit with the axes swapped so the slope stays
//! bounded; [`fit_oriented`] makes that decision.

use std::f64::consts::PI;

use crate::types::Point;

/// A path whose end-to-end rise exceeds this multiple of its run is
/// fit as `x(y)` instead of `y(x)`.
pub const VERTICAL_RATIO: f64 = 50.0;

/// A swapped-axis fit steeper than this is not really vertical and is
/// refit as `y(x)`.
pub const VERTICAL_SLOPE_LIMIT: f64 = 0.08;

/// Coefficients of a fitted line plus its chi-square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    /// Value of the dependent coordinate where the independent one is 0.
    pub intercept: f64,
    /// Change of the dependent coordinate per unit of the independent one.
    pub slope: f64,
    /// Sum of squared residuals.
    pub chi2: f64,
}

/// Fit `ys = intercept + slope * xs` by ordinary least squares.
///
/// # Panics
///
/// Panics if the slices differ in length or hold fewer than 2 values.
/// Both indicate a broken invariant in the caller.
#[must_use]
pub fn fit_line(xs: &[f64], ys: &[f64]) -> LineFit {
    assert_eq!(xs.len(), ys.len(), "line fit needs as many x as y values");
    assert!(xs.len() >= 2, "line fit needs at least 2 points");

    #[allow(clippy::cast_precision_loss)]
    let ss = xs.len() as f64;
    let sx: f64 = xs.iter().sum();
    let sy: f64 = ys.iter().sum();
    let sxoss = sx / ss;

    let mut st2 = 0.0;
    let mut b = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let t = x - sxoss;
        st2 += t * t;
        b += t * y;
    }
    b /= st2;
    let a = (sy - sx * b) / ss;

    let chi2 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - a - b * x;
            r * r
        })
        .sum();

    LineFit {
        intercept: a,
        slope: b,
        chi2,
    }
}

/// Reusable coordinate buffers for line fitting.
///
/// Passed explicitly through the pipeline so repeated fits reuse one
/// allocation without any shared state between runs.
#[derive(Debug, Default)]
pub struct Scratch {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Scratch {
    /// Create empty buffers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            xs: Vec::new(),
            ys: Vec::new(),
        }
    }

    fn load(&mut self, points: &[Point]) {
        self.xs.clear();
        self.ys.clear();
        self.xs.extend(points.iter().map(|p| p.x));
        self.ys.extend(points.iter().map(|p| p.y));
    }
}

/// A line fit together with the axis orientation it was computed in.
///
/// When `vertical` is `true` the fit expresses x as a function of y;
/// otherwise y as a function of x.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedFit {
    /// The fitted coefficients.
    pub fit: LineFit,
    /// Whether the fit is `x(y)`.
    pub vertical: bool,
}

impl OrientedFit {
    /// Direction of the fitted line in image space, in radians within
    /// `(-PI/2, PI]`.
    #[must_use]
    pub fn direction(&self) -> f64 {
        if self.vertical {
            1.0_f64.atan2(self.fit.slope)
        } else {
            self.fit.slope.atan()
        }
    }
}

/// Fit a line through `points`, choosing the axis orientation from the
/// first and last point.
///
/// A path is treated as vertical when its rise exceeds
/// [`VERTICAL_RATIO`] times its run. If the swapped fit then turns out
/// steeper than [`VERTICAL_SLOPE_LIMIT`] the path is reclassified as
/// horizontal and refit. A horizontal fit is never re-checked the other
/// way.
///
/// # Panics
///
/// Panics if `points` holds fewer than 2 points.
#[must_use]
pub fn fit_oriented(points: &[Point], scratch: &mut Scratch) -> OrientedFit {
    assert!(points.len() >= 2, "oriented fit needs at least 2 points");
    let first = points[0];
    let last = points[points.len() - 1];
    let rise = (last.y - first.y).abs();
    let run = (last.x - first.x).abs();

    scratch.load(points);
    let mut vertical = rise > VERTICAL_RATIO * run;
    let mut fit = if vertical {
        fit_line(&scratch.ys, &scratch.xs)
    } else {
        fit_line(&scratch.xs, &scratch.ys)
    };

    if vertical && fit.slope.abs() > VERTICAL_SLOPE_LIMIT {
        vertical = false;
        fit = fit_line(&scratch.xs, &scratch.ys);
    }

    OrientedFit { fit, vertical }
}

/// Smallest angle between two undirected lines given their directions.
///
/// Result lies in `[0, PI/2]`.
#[must_use]
pub fn angle_between_lines(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}
