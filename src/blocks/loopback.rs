use crate::error::LayoutResult;
use crate::geometry::{Heading, Point};
use crate::layout::{Cell, PicLib};
use crate::route::{Pose, Router};

use super::Block;

/// A U-turn joining two neighbouring SSC ports one `ssc.pitch` apart.
///
/// Both ports face west: `a` at the origin and `b` one pitch above it.
/// The loop reaches `straight_length + radius + dr` to the east.
pub fn draw_loopback(lib: &mut PicLib, straight_length: f64) -> LayoutResult<Block> {
    let tc = lib.tech();
    let pitch = tc.ssc.pitch;
    let name = format!("loopback_{straight_length}");

    let cell = lib.cell_or_insert_with(&name, |lib| {
        let mut cell = Cell::new(name.as_str());
        let router = Router::new(&lib.tech);
        let mut wg = router.trace_from(Point::zero(), Heading::East);
        if straight_length > 0.0 {
            wg.horizontal(straight_length)?;
        }
        wg.turn_to(Heading::North)?;
        let rise = pitch - 2.0 * wg.bend_size();
        if rise > 0.0 {
            wg.vertical(rise)?;
        }
        wg.turn_to(Heading::West)?;
        wg.finish_at(Point::new(0.0, pitch))?;
        wg.draw(&mut cell);
        Ok(cell)
    })?;

    Ok(Block::new(cell)
        .with_port("a", Pose::new(Point::zero(), Heading::West))
        .with_port("b", Pose::new(Point::new(0.0, pitch), Heading::West)))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::AIST;
    use crate::tests::test_work_dir;

    #[test]
    fn test_loopback() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let lb = draw_loopback(&mut lib, 1.0)?;
        let bbox = lb.cell.bbox().unwrap();
        assert_abs_diff_eq!(bbox.p1.x, 1.0 + 10.1 + 0.22, epsilon = 1e-6);
        assert_abs_diff_eq!(lb.port("b")?.at.y, 127.0);

        let work_dir = test_work_dir("test_loopback");
        lib.save_gds(&lb.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }
}
