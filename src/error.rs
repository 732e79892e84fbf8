use thiserror::Error as ThisError;

use crate::geometry::{Axis, Heading, Point};

pub type RouteResult<T> = std::result::Result<T, RouteError>;
pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while composing a waveguide route.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum RouteError {
    #[error("segment of length {length} um is shorter than the minimum segment length")]
    Degenerate { length: f64 },

    #[error("bends must turn by 45, 90, 135 or 180 degrees (got {angle})")]
    InvalidBend { angle: f64 },

    #[error("cannot run {axis} while heading {heading}")]
    OffAxis { axis: Axis, heading: Heading },

    #[error("{axis} run of {length} um points against heading {heading}")]
    Reversed {
        axis: Axis,
        length: f64,
        heading: Heading,
    },

    #[error("track {track} is {overshoot} um too close to turn onto from {at}")]
    Overshoot {
        track: f64,
        overshoot: f64,
        at: Point,
    },

    #[error("{target} is not ahead of {at} while heading {heading}")]
    OffTrack {
        target: Point,
        at: Point,
        heading: Heading,
    },

    #[error("cannot turn from {from} directly onto a track heading {to}")]
    NotPerpendicular { from: Heading, to: Heading },

    #[error("taper end width must be positive (got {width})")]
    InvalidWidth { width: f64 },
}

/// Errors raised while building or writing layout.
#[derive(Debug, ThisError)]
pub enum LayoutError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gds error: {0}")]
    Gds(#[from] gds21::GdsError),

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("two different cells are named `{0}`")]
    DuplicateCell(String),

    #[error("cell `{0}` not found")]
    MissingCell(String),

    #[error("cell `{cell}` has no port `{port}`")]
    MissingPort { cell: String, port: String },

    #[error("coordinate {0} um does not fit in the database grid")]
    Overflow(f64),

    #[error("no glyph for character {0:?}")]
    Glyph(char),

    #[error("design rule violated in {cell}: {rule}")]
    Rule { cell: String, rule: String },

    #[error("floorplan error: {0}")]
    Floorplan(String),

    #[error("cannot merge {path:?}: {reason}")]
    Merge { path: std::path::PathBuf, reason: String },
}

/// Errors raised while loading configuration.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown foundry cell `{0}`")]
    UnknownFoundryCell(String),

    #[error("foundry cell `{cell}` has no port `{port}`")]
    UnknownPort { cell: String, port: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
