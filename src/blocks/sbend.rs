use crate::error::LayoutResult;
use crate::geometry::{Heading, Point};
use crate::layout::{Cell, PicLib};
use crate::route::{Pose, Router};

use super::Block;

/// Draws a horizontal S-bend from `start` to `end` in a cell of its own.
///
/// The bend heads east when `end` lies to the right of `start` and west
/// otherwise; the vertical offset may go either way. Port `a` is at
/// `start` and port `b` at `end`.
pub fn draw_sbend(lib: &mut PicLib, name: &str, start: Point, end: Point) -> LayoutResult<Block> {
    let heading = if end.x >= start.x {
        Heading::East
    } else {
        Heading::West
    };
    let cell = lib.cell_or_insert_with(name, |lib| {
        let mut cell = Cell::new(name);
        let d = end - start;
        let mut wg = Router::new(&lib.tech).trace_from(start, heading);
        wg.sbend(d.x, d.y)?;
        wg.draw(&mut cell);
        Ok(cell)
    })?;
    Ok(Block::new(cell)
        .with_port("a", Pose::new(start, heading.opposite()))
        .with_port("b", Pose::new(end, heading)))
}
