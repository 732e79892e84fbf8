use serde::{Deserialize, Serialize};

use super::{Point, Polygon};

/// An axis-aligned rectangle.
///
/// `p0` is always the lower-left corner and `p1` the upper-right corner.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Point; 2]", into = "[Point; 2]")]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}

impl Rect {
    /// Creates a rectangle from any two opposite corners.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_center(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            Point::new(center.x - width / 2.0, center.y - height / 2.0),
            Point::new(center.x + width / 2.0, center.y + height / 2.0),
        )
    }

    /// The smallest rectangle containing all of `pts`.
    pub fn bounding(pts: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = pts.into_iter();
        let first = iter.next()?;
        let mut r = Self { p0: first, p1: first };
        for p in iter {
            r.p0.x = r.p0.x.min(p.x);
            r.p0.y = r.p0.y.min(p.y);
            r.p1.x = r.p1.x.max(p.x);
            r.p1.y = r.p1.y.max(p.y);
        }
        Some(r)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.p1.x - self.p0.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.p1.y - self.p0.y
    }

    pub fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2.0, (self.p0.y + self.p1.y) / 2.0)
    }

    /// Corners in counterclockwise order starting from the lower left.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.p0,
            Point::new(self.p1.x, self.p0.y),
            self.p1,
            Point::new(self.p0.x, self.p1.y),
        ]
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }

    /// Grows the rectangle by `dist` on every side.
    pub fn expand(&self, dist: f64) -> Rect {
        Rect {
            p0: Point::new(self.p0.x - dist, self.p0.y - dist),
            p1: Point::new(self.p1.x + dist, self.p1.y + dist),
        }
    }

    pub fn translate(&self, offset: Point) -> Rect {
        Rect {
            p0: self.p0 + offset,
            p1: self.p1 + offset,
        }
    }

    /// True if the rectangles share any point, edges included.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.p1.x < other.p0.x
            || self.p0.x > other.p1.x
            || self.p1.y < other.p0.y
            || self.p0.y > other.p1.y)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.p0.x && p.x <= self.p1.x && p.y >= self.p0.y && p.y <= self.p1.y
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.corners().to_vec())
    }
}

impl From<[Point; 2]> for Rect {
    fn from(value: [Point; 2]) -> Self {
        Rect::new(value[0], value[1])
    }
}

impl From<Rect> for [Point; 2] {
    fn from(value: Rect) -> Self {
        [value.p0, value.p1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::new(Point::new(-0.5, 61.5), Point::new(-14.5, 30.5));
        assert_eq!(r.p0, Point::new(-14.5, 30.5));
        assert_eq!(r.p1, Point::new(-0.5, 61.5));
        assert_eq!(r.width(), 14.0);
        assert_eq!(r.height(), 31.0);
    }

    #[test]
    fn test_overlap_includes_touching_edges() {
        let a = Rect::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let b = Rect::new(Point::new(10.0, 5.0), Point::new(20.0, 6.0));
        let c = Rect::new(Point::new(10.5, 5.0), Point::new(20.0, 6.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
