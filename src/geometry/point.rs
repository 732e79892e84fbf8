use std::fmt::Display;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A location in the layout plane, in micrometers.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Unit vector pointing `deg` degrees counterclockwise from the +x axis.
    pub fn polar(deg: f64) -> Self {
        let rad = deg.to_radians();
        Self::new(rad.cos(), rad.sin())
    }

    #[inline]
    pub fn dot(&self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// The z component of `self x other`.
    #[inline]
    pub fn cross(&self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dist(&self, other: Point) -> f64 {
        (*self - other).norm()
    }

    /// Rotates the vector 90 degrees counterclockwise.
    #[inline]
    pub fn perp(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            *self
        } else {
            Self::new(self.x / n, self.y / n)
        }
    }

    /// Rotates about the origin by `deg` degrees counterclockwise.
    pub fn rotate(&self, deg: f64) -> Self {
        // Quarter turns come up constantly; keep them exact.
        let quarter = deg / 90.0;
        if (quarter - quarter.round()).abs() < 1e-12 {
            return match (quarter.round() as i64).rem_euclid(4) {
                0 => *self,
                1 => Self::new(-self.y, self.x),
                2 => Self::new(-self.x, -self.y),
                _ => Self::new(self.y, -self.x),
            };
        }
        let (s, c) = deg.to_radians().sin_cos();
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    pub fn approx_eq(&self, other: Point, tol: f64) -> bool {
        (self.x - other.x).abs() <= tol && (self.y - other.y).abs() <= tol
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<(f64, f64)> for Point {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<Point> for [f64; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
