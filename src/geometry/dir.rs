use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::Point;

/// One of the eight compass directions a waveguide may travel in.
///
/// Headings are ordered counterclockwise starting from east,
/// so that the discriminant is the angle in units of 45 degrees.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    East = 0,
    NorthEast = 1,
    North = 2,
    NorthWest = 3,
    West = 4,
    SouthWest = 5,
    South = 6,
    SouthEast = 7,
}

/// A direction: horizontal or vertical.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// The side toward which a bend turns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Turn {
    Left,
    Right,
}

const HEADINGS: [Heading; 8] = [
    Heading::East,
    Heading::NorthEast,
    Heading::North,
    Heading::NorthWest,
    Heading::West,
    Heading::SouthWest,
    Heading::South,
    Heading::SouthEast,
];

impl Heading {
    /// The heading `eighths` steps of 45 degrees counterclockwise from east.
    #[inline]
    pub fn from_eighths(eighths: i32) -> Self {
        HEADINGS[eighths.rem_euclid(8) as usize]
    }

    /// The heading closest to `deg` degrees counterclockwise from east.
    pub fn from_angle(deg: f64) -> Self {
        Self::from_eighths((deg / 45.0).round() as i32)
    }

    #[inline]
    pub fn eighths(&self) -> i32 {
        *self as i32
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        45.0 * self.eighths() as f64
    }

    /// Exact unit vector for this heading.
    pub fn unit(&self) -> Point {
        let d = FRAC_1_SQRT_2;
        match *self {
            Self::East => Point::new(1.0, 0.0),
            Self::NorthEast => Point::new(d, d),
            Self::North => Point::new(0.0, 1.0),
            Self::NorthWest => Point::new(-d, d),
            Self::West => Point::new(-1.0, 0.0),
            Self::SouthWest => Point::new(-d, -d),
            Self::South => Point::new(0.0, -1.0),
            Self::SouthEast => Point::new(d, -d),
        }
    }

    /// Rotates counterclockwise by `eighths` steps of 45 degrees.
    #[inline]
    pub fn rotate(&self, eighths: i32) -> Self {
        Self::from_eighths(self.eighths() + eighths)
    }

    #[inline]
    pub fn opposite(&self) -> Self {
        self.rotate(4)
    }

    #[inline]
    pub fn left(&self) -> Self {
        self.rotate(2)
    }

    #[inline]
    pub fn right(&self) -> Self {
        self.rotate(-2)
    }

    /// The axis this heading runs along, if it is not diagonal.
    pub fn axis(&self) -> Option<Axis> {
        match *self {
            Self::East | Self::West => Some(Axis::Horizontal),
            Self::North | Self::South => Some(Axis::Vertical),
            _ => None,
        }
    }

    #[inline]
    pub fn is_cardinal(&self) -> bool {
        self.axis().is_some()
    }

    /// Signed number of 45 degree steps from `self` to `other`,
    /// in `-3..=4`. A half turn is reported as `4`.
    pub fn steps_to(&self, other: Heading) -> i32 {
        let d = (other.eighths() - self.eighths()).rem_euclid(8);
        if d > 4 {
            d - 8
        } else {
            d
        }
    }

    pub fn short_form(&self) -> &'static str {
        match *self {
            Self::East => "E",
            Self::NorthEast => "NE",
            Self::North => "N",
            Self::NorthWest => "NW",
            Self::West => "W",
            Self::SouthWest => "SW",
            Self::South => "S",
            Self::SouthEast => "SE",
        }
    }
}

impl Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::East => write!(f, "east"),
            Self::NorthEast => write!(f, "northeast"),
            Self::North => write!(f, "north"),
            Self::NorthWest => write!(f, "northwest"),
            Self::West => write!(f, "west"),
            Self::SouthWest => write!(f, "southwest"),
            Self::South => write!(f, "south"),
            Self::SouthEast => write!(f, "southeast"),
        }
    }
}

impl Axis {
    pub fn short_form(&self) -> &'static str {
        match *self {
            Self::Horizontal => "h",
            Self::Vertical => "v",
        }
    }

    /// The coordinate of `p` along this axis.
    #[inline]
    pub fn coord(&self, p: Point) -> f64 {
        match *self {
            Self::Horizontal => p.x,
            Self::Vertical => p.y,
        }
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Horizontal => write!(f, "horizontal"),
            Self::Vertical => write!(f, "vertical"),
        }
    }
}

impl Turn {
    /// +1 for counterclockwise turns, -1 for clockwise turns.
    #[inline]
    pub fn sign(&self) -> i32 {
        match *self {
            Self::Left => 1,
            Self::Right => -1,
        }
    }

    #[inline]
    pub fn flip(&self) -> Self {
        match *self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}
