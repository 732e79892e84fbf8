use serde::{Deserialize, Serialize};

use super::{Heading, Point, Rect};

/// Rotation about the origin, optionally preceded by a reflection across the x axis.
///
/// This is the orientation model of GDS `STRANS` records.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(default)]
    pub reflect: bool,
    /// Counterclockwise rotation in degrees.
    #[serde(default)]
    pub angle: f64,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        reflect: false,
        angle: 0.0,
    };

    #[inline]
    pub fn rotated(angle: f64) -> Self {
        Self {
            reflect: false,
            angle,
        }
    }

    #[inline]
    pub fn reflected(angle: f64) -> Self {
        Self {
            reflect: true,
            angle,
        }
    }

    /// Mirrors the x coordinate (`x -> -x`).
    #[inline]
    pub fn mirror_x() -> Self {
        Self::reflected(180.0)
    }

    pub fn apply(&self, p: Point) -> Point {
        let p = if self.reflect { Point::new(p.x, -p.y) } else { p };
        p.rotate(self.angle)
    }

    pub fn apply_heading(&self, h: Heading) -> Heading {
        let a = if self.reflect { -h.angle() } else { h.angle() };
        Heading::from_angle(a + self.angle)
    }

    /// The orientation equivalent to applying `inner` and then `self`.
    pub fn compose(&self, inner: &Orientation) -> Orientation {
        let angle = if self.reflect {
            self.angle - inner.angle
        } else {
            self.angle + inner.angle
        };
        Orientation {
            reflect: self.reflect ^ inner.reflect,
            angle: normalize_angle(angle),
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.reflect && normalize_angle(self.angle) == 0.0
    }
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_angle(deg: f64) -> f64 {
    let a = deg.rem_euclid(360.0);
    if (360.0 - a).abs() < 1e-9 {
        0.0
    } else {
        a
    }
}

/// An orientation followed by a translation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub offset: Point,
    pub orientation: Orientation,
}

impl Transform {
    pub fn new(offset: Point, orientation: Orientation) -> Self {
        Self {
            offset,
            orientation,
        }
    }

    pub fn translate(offset: Point) -> Self {
        Self {
            offset,
            orientation: Orientation::IDENTITY,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        self.orientation.apply(p) + self.offset
    }

    #[inline]
    pub fn apply_heading(&self, h: Heading) -> Heading {
        self.orientation.apply_heading(h)
    }

    /// Bounding box of a transformed rectangle.
    pub fn apply_rect(&self, r: &Rect) -> Rect {
        Rect::bounding(r.corners().into_iter().map(|p| self.apply(p)))
            .unwrap_or_default()
    }

    /// The transform equivalent to applying `inner` and then `self`.
    pub fn compose(&self, inner: &Transform) -> Transform {
        Transform {
            offset: self.apply(inner.offset),
            orientation: self.orientation.compose(&inner.orientation),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_reflect_then_rotate_mirrors_x() {
        let o = Orientation::mirror_x();
        let p = o.apply(Point::new(3.0, 62.0));
        assert_abs_diff_eq!(p.x, -3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 62.0, epsilon = 1e-12);
        assert_eq!(o.apply_heading(Heading::East), Heading::West);
        assert_eq!(o.apply_heading(Heading::North), Heading::North);
    }

    #[test]
    fn test_compose_matches_sequential_application() {
        let inner = Transform::new(Point::new(5.0, -2.0), Orientation::reflected(90.0));
        let outer = Transform::new(Point::new(-100.0, 30.0), Orientation::rotated(-90.0));
        let both = outer.compose(&inner);
        for p in [Point::new(1.0, 2.0), Point::new(-7.5, 0.25)] {
            let a = outer.apply(inner.apply(p));
            let b = both.apply(p);
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
        }
        for h in [Heading::East, Heading::NorthEast, Heading::South] {
            assert_eq!(
                outer.apply_heading(inner.apply_heading(h)),
                both.apply_heading(h)
            );
        }
    }
}
