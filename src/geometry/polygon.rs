use serde::{Deserialize, Serialize};

use super::{Point, Rect, Transform};

/// Maximum distance between a sampled arc and the true circle, in micrometers.
pub const ARC_TOLERANCE: f64 = 1e-3;

/// Pieces smaller than this (in square micrometers) are dropped by boolean operations.
const MIN_AREA: f64 = 1e-9;

/// A closed ring of points.
///
/// The closing edge from the last point back to the first is implicit.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

/// Number of chords needed to approximate an arc of `radius` sweeping `sweep_deg`
/// degrees to within [`ARC_TOLERANCE`].
pub fn arc_segments(radius: f64, sweep_deg: f64) -> usize {
    let sweep = sweep_deg.abs().to_radians();
    if radius <= ARC_TOLERANCE || sweep == 0.0 {
        return 1;
    }
    let max_step = 2.0 * (1.0 - ARC_TOLERANCE / radius).acos();
    ((sweep / max_step).ceil() as usize).max(1)
}

/// Samples a circular arc from `start_deg` to `end_deg`, both ends included.
pub fn arc_points(center: Point, radius: f64, start_deg: f64, end_deg: f64) -> Vec<Point> {
    let n = arc_segments(radius, end_deg - start_deg);
    (0..=n)
        .map(|i| {
            let a = start_deg + (end_deg - start_deg) * i as f64 / n as f64;
            center + Point::polar(a) * radius
        })
        .collect()
}

impl Polygon {
    #[inline]
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn from_rect(rect: Rect) -> Self {
        rect.to_polygon()
    }

    /// A circular sector with its apex at `apex`, spanning `start_deg` to `end_deg`.
    pub fn sector(apex: Point, radius: f64, start_deg: f64, end_deg: f64) -> Self {
        let mut points = vec![apex];
        points.extend(arc_points(apex, radius, start_deg, end_deg));
        Self { points }
    }

    /// A curved band of the given `width` centered on the circle of `radius`.
    pub fn annular_sector(
        center: Point,
        radius: f64,
        width: f64,
        start_deg: f64,
        end_deg: f64,
    ) -> Self {
        let mut points = arc_points(center, radius + width / 2.0, start_deg, end_deg);
        let mut inner = arc_points(center, radius - width / 2.0, start_deg, end_deg);
        inner.reverse();
        points.extend(inner);
        Self { points }
    }

    /// Shoelace area. Positive for counterclockwise rings.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            acc += self.points[i].cross(self.points[(i + 1) % n]);
        }
        acc / 2.0
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn bbox(&self) -> Option<Rect> {
        Rect::bounding(self.points.iter().copied())
    }

    pub fn translate(&self, offset: Point) -> Self {
        Self {
            points: self.points.iter().map(|&p| p + offset).collect(),
        }
    }

    pub fn transform(&self, t: &Transform) -> Self {
        Self {
            points: self.points.iter().map(|&p| t.apply(p)).collect(),
        }
    }

    /// Clips the polygon to the half plane where `dot(p, normal) <= limit`.
    ///
    /// Exact for convex polygons; concave input may produce degenerate
    /// bridge edges.
    fn clip(&self, normal: Point, limit: f64) -> Self {
        let n = self.points.len();
        let mut out = Vec::with_capacity(n + 2);
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let da = a.dot(normal) - limit;
            let db = b.dot(normal) - limit;
            if da <= 0.0 {
                out.push(a);
            }
            if (da < 0.0 && db > 0.0) || (da > 0.0 && db < 0.0) {
                let t = da / (da - db);
                out.push(a + (b - a) * t);
            }
        }
        Self { points: out }
    }

    /// Boolean difference of a convex polygon and an axis aligned rectangle.
    ///
    /// The result is returned as up to four convex pieces: left of the
    /// rectangle, right of it, and below and above it within its x span.
    pub fn subtract_rect(&self, rect: &Rect) -> Vec<Polygon> {
        let Rect { p0, p1 } = *rect;
        let left = self.clip(Point::new(1.0, 0.0), p0.x);
        let right = self.clip(Point::new(-1.0, 0.0), -p1.x);
        let middle = self
            .clip(Point::new(-1.0, 0.0), -p0.x)
            .clip(Point::new(1.0, 0.0), p1.x);
        let below = middle.clip(Point::new(0.0, 1.0), p0.y);
        let above = middle.clip(Point::new(0.0, -1.0), -p1.y);

        [left, right, below, above]
            .into_iter()
            .filter(|p| p.points.len() >= 3 && p.area() > MIN_AREA)
            .collect()
    }
}

impl From<Rect> for Polygon {
    fn from(value: Rect) -> Self {
        value.to_polygon()
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    #[test]
    fn test_arc_sampling_meets_tolerance() {
        let r = 10.0;
        let pts = arc_points(Point::zero(), r, 0.0, 90.0);
        assert!(pts.len() > 2);
        for w in pts.windows(2) {
            let mid = (w[0] + w[1]) * 0.5;
            assert!(r - mid.norm() <= ARC_TOLERANCE + 1e-12);
        }
        assert_abs_diff_eq!(pts[0].x, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pts.last().unwrap().y, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_subtract_centered_strip() {
        let square = Polygon::from_rect(Rect::new(Point::new(0.0, -2.0), Point::new(10.0, 2.0)));
        let strip = Rect::new(Point::new(-1.0, -0.255), Point::new(11.0, 0.255));
        let pieces = square.subtract_rect(&strip);
        assert_eq!(pieces.len(), 2);
        let total: f64 = pieces.iter().map(|p| p.area()).sum();
        assert_relative_eq!(total, 40.0 - 10.0 * 0.51, epsilon = 1e-9);
    }

    #[test]
    fn test_subtract_disjoint_rect_keeps_polygon() {
        let tri = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 4.0),
        ]);
        let far = Rect::new(Point::new(10.0, 10.0), Point::new(12.0, 12.0));
        let pieces = tri.subtract_rect(&far);
        let total: f64 = pieces.iter().map(|p| p.area()).sum();
        assert_relative_eq!(total, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sector_area() {
        let s = Polygon::sector(Point::zero(), 100.0, -10.0, 10.0);
        let exact = std::f64::consts::PI * 100.0 * 100.0 * 20.0 / 360.0;
        assert_relative_eq!(s.area(), exact, max_relative = 1e-4);
    }
}
