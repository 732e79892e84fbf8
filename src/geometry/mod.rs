//! Planar geometry in micrometer units.

pub mod dir;
pub mod point;
pub mod polygon;
pub mod rect;
pub mod transform;

pub use dir::{Axis, Heading, Turn};
pub use point::Point;
pub use polygon::{arc_points, arc_segments, Polygon, ARC_TOLERANCE};
pub use rect::Rect;
pub use transform::{normalize_angle, Orientation, Transform};
