//! Spot-size converters.
//!
//! The cell origin sits on the chip edge. A narrow waveguide crosses the
//! dicing lane, which extends `dicing_length` to either side of the edge,
//! and then widens to the routing width over `length`.

use serde::{Deserialize, Serialize};

use crate::error::LayoutResult;
use crate::geometry::{Heading, Point, Rect};
use crate::layout::{Cell, PicLib};
use crate::route::{Pose, Router};

use super::Block;

/// The chip edge an SSC sits on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Heading from the chip interior toward this edge.
    pub fn outward(&self) -> Heading {
        match *self {
            Side::Left => Heading::West,
            Side::Right => Heading::East,
        }
    }
}

pub fn ssc_name(side: Side) -> &'static str {
    match side {
        Side::Left => "ssc_left",
        Side::Right => "ssc_right",
    }
}

/// Draws an SSC. Port `wg` is the wide end, `facet` the narrow end at the
/// outer edge of the dicing lane.
pub fn draw_ssc(lib: &mut PicLib, side: Side) -> LayoutResult<Block> {
    let tc = lib.tech();
    let ssc = &tc.ssc;
    let dicing = ssc.dicing_length;
    let out = side.outward();
    // Distance along the outward heading, measured from the chip edge.
    let along = |d: f64| out.unit() * d;

    let cell = lib.cell_or_insert_with(ssc_name(side), |lib| {
        let mut cell = Cell::new(ssc_name(side));
        let router = Router::new(&lib.tech);

        let mut wg = router.trace_from(along(-ssc.reach()), out);
        wg.taper(ssc.length, ssc.width_small)?;
        wg.straight(dicing)?.straight(dicing)?;
        wg.draw(&mut cell);

        let h = ssc.box_half_height;
        let layer = tc.layers.ssc.spec;
        let lane = Rect::new(Point::new(-dicing, -h), Point::new(dicing, h));
        let taper = Rect::new(along(-dicing) + Point::new(0.0, -h), along(-ssc.reach()) + Point::new(0.0, h));
        cell.add_rect(layer, lane);
        cell.add_rect(layer, taper);
        Ok(cell)
    })?;

    Ok(Block::new(cell)
        .with_port("wg", Pose::new(along(-ssc.reach()), out.opposite()))
        .with_port("facet", Pose::new(along(dicing), out)))
}
