//! The trace corridor: the area swept by the user's pen.
//!
//! At every trace point the pen's half-width is laid off on both sides,
//! perpendicular to the local direction of travel. The corridor polygon
//! runs along one side forward and back along the other.

use geo::{BoundingRect, Contains, Coord, Intersects, LineString, Polygon, Rect};

use crate::types::{GuideTrace, Point};

/// Trace neighbors closer than this (squared, in px²) are skipped when
/// estimating the local direction of travel.
const NEIGHBOR_MIN_DISTANCE_SQ: f64 = 4.0;

/// Upper bound on bisection steps.
const BISECTION_MAX_ITERATIONS: usize = 50;

/// Bisection may stop once consecutive midpoints are this close (px²)...
const BISECTION_STEP_TOLERANCE_SQ: f64 = 1.0;

/// ...and the bracket is narrower than this fraction of the segment.
const BISECTION_MIN_BRACKET: f64 = 1.0 / 32.0;

/// Closed polygon around a guide trace.
///
/// Points on the polygon boundary are outside.
#[derive(Debug, Clone)]
pub struct TraceCorridor {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
    trace: Vec<Point>,
}

impl TraceCorridor {
    /// Build the corridor around a trace.
    ///
    /// The trace must hold at least one point; callers check this with
    /// [`GuideTrace::validate`]. A single-point trace yields a corridor
    /// with no area.
    #[must_use]
    pub fn build(trace: &GuideTrace) -> Self {
        let points = &trace.points;
        let radius = f64::from(trace.pen_width) / 2.0;
        let mut top = Vec::with_capacity(points.len());
        let mut bottom = Vec::with_capacity(points.len());
        let mut degenerate = 0_usize;

        for (i, &p) in points.iter().enumerate() {
            let before = points[..i]
                .iter()
                .rev()
                .find(|q| p.distance_squared(**q) > NEIGHBOR_MIN_DISTANCE_SQ)
                .or_else(|| points.first())
                .copied()
                .unwrap_or(p);
            let after = points[i + 1..]
                .iter()
                .find(|q| p.distance_squared(**q) > NEIGHBOR_MIN_DISTANCE_SQ)
                .or_else(|| points.last())
                .copied()
                .unwrap_or(p);

            let (mut dx, mut dy) = (after.x - before.x, after.y - before.y);
            let len = dx.hypot(dy);
            if len == 0.0 {
                degenerate += 1;
                (dx, dy) = (1.0, 0.0);
            } else {
                dx /= len;
                dy /= len;
            }

            // Offset along the normal, flipped so the "top" side stays on
            // the same side for left- and right-going strokes.
            let sign = if dx < 0.0 { -1.0 } else { 1.0 };
            let (nx, ny) = (-dy * radius * sign, dx * radius * sign);
            top.push(p.translate(nx, ny));
            bottom.push(p.translate(-nx, -ny));
        }

        if degenerate > 0 {
            log::warn!(
                "{degenerate} of {} trace points have no usable direction; assuming horizontal",
                points.len()
            );
        }

        let mut ring = top;
        ring.extend(bottom.into_iter().rev());
        Self::from_ring(ring, points.clone())
    }

    /// Wrap an explicit polygon ring around `trace`.
    #[must_use]
    pub fn from_ring(ring: Vec<Point>, trace: Vec<Point>) -> Self {
        let exterior: LineString<f64> = ring.into_iter().map(Coord::from).collect();
        let polygon = Polygon::new(exterior, vec![]);
        let bounds = polygon.bounding_rect().unwrap_or_else(|| {
            let c = trace.first().map_or_else(Coord::zero, |p| Coord::from(*p));
            Rect::new(c, c)
        });
        Self {
            polygon,
            bounds,
            trace,
        }
    }

    /// The trace points the corridor was built around.
    #[must_use]
    pub fn trace(&self) -> &[Point] {
        &self.trace
    }

    /// The corridor outline.
    #[must_use]
    pub const fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Bounding box of the corridor outline.
    #[must_use]
    pub const fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Whether `p` lies strictly inside the corridor.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        let c = Coord::from(p);
        self.bounds.intersects(&c) && self.polygon.contains(&c)
    }

    /// Whether `rect` overlaps the corridor's bounding box.
    #[must_use]
    pub fn bounds_overlap(&self, rect: &Rect<f64>) -> bool {
        self.bounds.intersects(rect)
    }

    /// Fraction of the way from `pa` to `pb` at which the segment
    /// crosses the corridor boundary.
    ///
    /// # Panics
    ///
    /// Panics if `pa` and `pb` are on the same side of the boundary.
    #[must_use]
    pub fn crossing_fraction(&self, pa: Point, pb: Point) -> f64 {
        let mut inside_a = self.contains(pa);
        assert_ne!(
            inside_a,
            self.contains(pb),
            "boundary bisection needs one point inside and one outside"
        );

        let (dx, dy) = (pb.x - pa.x, pb.y - pa.y);
        let (mut a, mut b, mut c) = (0.0_f64, 1.0_f64, 0.0_f64);
        let mut previous: Option<Point> = None;
        for _ in 0..BISECTION_MAX_ITERATIONS {
            c = a + (b - a) * 0.5;
            let mid = Point::new(c.mul_add(dx, pa.x), c.mul_add(dy, pa.y));
            let inside_c = self.contains(mid);
            if inside_c == inside_a {
                a = c;
                inside_a = inside_c;
            } else {
                b = c;
            }

            let settled = previous
                .is_some_and(|q| q.distance_squared(mid) < BISECTION_STEP_TOLERANCE_SQ);
            if settled && b - a < BISECTION_MIN_BRACKET {
                break;
            }
            previous = Some(mid);
        }
        c
    }

    /// Length of the polyline `points` that lies inside the corridor.
    ///
    /// Segments crossing the boundary contribute the part on the inside,
    /// located by bisection.
    #[must_use]
    pub fn inside_length(&self, points: &[Point]) -> f64 {
        let Some((&first, rest)) = points.split_first() else {
            return 0.0;
        };
        let mut total = 0.0;
        let mut prev = first;
        let mut prev_inside = self.contains(first);
        for &p in rest {
            let inside = self.contains(p);
            let seg = prev.distance(p);
            total += match (prev_inside, inside) {
                (true, true) => seg,
                (true, false) => seg * self.crossing_fraction(prev, p),
                (false, true) => seg * (1.0 - self.crossing_fraction(prev, p)),
                (false, false) => 0.0,
            };
            prev = p;
            prev_inside = inside;
        }
        total
    }
}
