use std::fmt::Display;

use serde::Serialize;

use crate::geometry::{Heading, Point, Polygon, Turn};
use crate::tech::LayerSpec;

/// Position and direction of travel of a waveguide end.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Pose {
    pub at: Point,
    pub heading: Heading,
}

impl Pose {
    #[inline]
    pub const fn new(at: Point, heading: Heading) -> Self {
        Self { at, heading }
    }

    /// The same location facing the other way.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            at: self.at,
            heading: self.heading.opposite(),
        }
    }

    pub fn approx_eq(&self, other: &Pose, tol: f64) -> bool {
        self.heading == other.heading && self.at.approx_eq(other.at, tol)
    }
}

impl Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.at, self.heading.short_form())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum SegmentKind {
    Straight,
    Taper,
    Bend { turn: Turn, angle: f64 },
}

/// One piece of a waveguide emitted by a [`Trace`](super::Trace).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Centerline from `start.at` to `end.at`.
    pub points: Vec<Point>,
    pub start_width: f64,
    pub end_width: f64,
    pub layer: LayerSpec,
    pub start: Pose,
    pub end: Pose,
    /// Centerline length.
    pub length: f64,
}

impl Segment {
    /// The filled outline of this segment, with the width varying
    /// linearly along the centerline.
    pub fn outline(&self) -> Polygon {
        let pts = &self.points;
        let n = pts.len();
        if n < 2 {
            return Polygon::default();
        }

        let mut dist = Vec::with_capacity(n);
        let mut acc = 0.0;
        dist.push(0.0);
        for w in pts.windows(2) {
            acc += w[0].dist(w[1]);
            dist.push(acc);
        }
        let total = if acc > 0.0 { acc } else { 1.0 };

        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);
        for i in 0..n {
            let normal = if i == 0 {
                self.start.heading.unit().perp()
            } else if i == n - 1 {
                self.end.heading.unit().perp()
            } else {
                let e1 = (pts[i] - pts[i - 1]).normalized();
                let e2 = (pts[i + 1] - pts[i]).normalized();
                let n1 = e1.perp();
                let miter = (e1 + e2).normalized().perp();
                // Miter length is stretched so that both offset edges stay parallel.
                miter * (1.0 / miter.dot(n1))
            };
            let w = self.start_width + (self.end_width - self.start_width) * dist[i] / total;
            left.push(pts[i] + normal * (w / 2.0));
            right.push(pts[i] - normal * (w / 2.0));
        }
        right.reverse();
        left.extend(right);
        Polygon::new(left)
    }
}
