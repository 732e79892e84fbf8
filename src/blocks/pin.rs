//! Carrier-injection (PIN) phase shifters.
//!
//! The device runs north from port `in` at the origin. A silicon taper
//! widens the waveguide into a 30 um slab of the requested length; the rib
//! layer covers the slab except for a strip over the waveguide core, and
//! the N side lies west of the core.

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Heading, Point, Rect};
use crate::layout::{Cell, PicLib};
use crate::route::{Pose, Router};

use super::Block;

const SLAB_WIDTH: f64 = 30.0;
const TAPER_MID_WIDTH: f64 = 0.51;
const TAPER_WIDE_WIDTH: f64 = 2.0;
const TAPER_NARROW_LENGTH: f64 = 10.0;
const TAPER_WIDE_LENGTH: f64 = 20.0;

const RIB_NARROW_WIDTH: f64 = 2.44;
const RIB_MID_WIDTH: f64 = 2.51;
const RIB_WIDE_WIDTH: f64 = 4.0;
const RIB_SLAB_WIDTH: f64 = 32.0;
const RIB_WIDE_LENGTH: f64 = 19.0;

/// Width of the implant windows on either side of the core.
const IMPLANT_WIDTH: f64 = 14.0;
/// Space from the core center to the N+ and P+ windows.
const IMPLANT_SPACE: f64 = 0.5;
/// Pull-back of the N++ and P++ windows from the core side.
const HEAVY_SPACE: f64 = 0.65;
const CONTACT_WIDTH: f64 = 7.0;
const CONTACT_INSET: f64 = 1.5;

/// Length of the device outside the slab: the tapers on both ends.
pub const PIN_OVERHEAD: f64 = 62.0;
/// Distance from port `in` to the start of the 30 um slab.
pub const SLAB_OFFSET: f64 = TAPER_NARROW_LENGTH + TAPER_WIDE_LENGTH;

/// Length of the 30 um slab of a device with `length` um of doping.
#[inline]
pub fn slab_length(length: f64) -> f64 {
    length + 2.0
}

fn rule(cell: &str, rule: String) -> LayoutError {
    LayoutError::Rule {
        cell: cell.to_string(),
        rule,
    }
}

fn check(cell: &str, what: &str, actual: f64, expected: f64) -> LayoutResult<()> {
    if (actual - expected).abs() > 1e-6 {
        return Err(rule(cell, format!("{what} is {actual} um, expected {expected} um")));
    }
    Ok(())
}

/// Draws a PIN phase shifter with a doped slab `length` um long.
///
/// Ports: `in` at the origin facing south and `out` at
/// `(0, length + PIN_OVERHEAD)` facing north.
pub fn draw_pin(lib: &mut PicLib, length: f64) -> LayoutResult<Block> {
    let name = format!("PIN_L{length}");
    if length <= 2.0 {
        return Err(rule(&name, format!("slab length {length} um leaves no room for contacts")));
    }
    let total = length + PIN_OVERHEAD;

    let cell = lib.cell_or_insert_with(&name, |lib| {
        let tc = lib.tech();
        let layers = &tc.layers;
        let mut cell = Cell::new(name.as_str());
        let router = Router::new(&tc);

        let mut si = router.trace_from(Point::zero(), Heading::North);
        si.taper(TAPER_NARROW_LENGTH, TAPER_MID_WIDTH)?
            .taper(TAPER_WIDE_LENGTH, TAPER_WIDE_WIDTH)?
            .set_width(SLAB_WIDTH)?
            .straight(slab_length(length))?
            .set_width(TAPER_WIDE_WIDTH)?
            .taper(TAPER_WIDE_LENGTH, TAPER_MID_WIDTH)?
            .taper(TAPER_NARROW_LENGTH, tc.waveguide.width)?;
        si.draw(&mut cell);

        let mut rib = router.trace_from(Point::zero(), Heading::North);
        rib.set_layer(layers.rib.spec).set_width(RIB_NARROW_WIDTH)?;
        rib.taper(TAPER_NARROW_LENGTH, RIB_MID_WIDTH)?
            .taper(RIB_WIDE_LENGTH, RIB_WIDE_WIDTH)?
            .set_width(RIB_SLAB_WIDTH)?
            .straight(length + 4.0)?
            .set_width(RIB_WIDE_WIDTH)?
            .taper(RIB_WIDE_LENGTH, RIB_MID_WIDTH)?
            .taper(TAPER_NARROW_LENGTH, RIB_NARROW_WIDTH)?;
        if (rib.at().y - total).abs() > 1e-6 {
            return Err(rule(&name, format!("rib ends at {} um, expected {total} um", rib.at().y)));
        }
        let core = Rect::new(
            Point::new(-TAPER_MID_WIDTH / 2.0, 0.0),
            Point::new(TAPER_MID_WIDTH / 2.0, total),
        );
        for seg in rib.segments() {
            for piece in seg.outline().subtract_rect(&core) {
                cell.add_polygon(layers.rib.spec, piece);
            }
        }

        // Implants start 0.5 um before the slab and end 0.5 um after it.
        let y0 = TAPER_NARROW_LENGTH + RIB_WIDE_LENGTH + 1.5;
        let outer = IMPLANT_SPACE + IMPLANT_WIDTH;
        let light = |sign: f64| {
            Rect::new(
                Point::new(sign * IMPLANT_SPACE, y0),
                Point::new(sign * outer, y0 + length + 1.0),
            )
        };
        let heavy = |sign: f64| {
            Rect::new(
                Point::new(sign * (IMPLANT_SPACE + HEAVY_SPACE), y0 + 0.5),
                Point::new(sign * outer, y0 + 0.5 + length),
            )
        };
        let contact = |sign: f64| {
            let inner = outer - CONTACT_INSET - CONTACT_WIDTH;
            Rect::new(
                Point::new(sign * inner, y0 + CONTACT_INSET),
                Point::new(sign * (outer - CONTACT_INSET), y0 + length + 1.0 - CONTACT_INSET),
            )
        };

        let npp = heavy(-1.0);
        check(&name, "N++ height", npp.height(), length)?;
        for sign in [-1.0, 1.0] {
            let ct = contact(sign);
            check(&name, "contact width", ct.width(), CONTACT_WIDTH)?;
            check(&name, "contact height", ct.height(), length - 2.0)?;
            cell.add_rect(layers.ct2pn.spec, ct);
        }
        cell.add_rect(layers.np.spec, light(-1.0));
        cell.add_rect(layers.pp.spec, light(1.0));
        cell.add_rect(layers.npp.spec, npp);
        cell.add_rect(layers.ppp.spec, heavy(1.0));
        Ok(cell)
    })?;

    Ok(Block::new(cell)
        .with_port("in", Pose::new(Point::zero(), Heading::South))
        .with_port("out", Pose::new(Point::new(0.0, total), Heading::North)))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::{LayerSpec, AIST};
    use crate::tests::test_work_dir;

    #[test]
    fn test_pin() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let pin = draw_pin(&mut lib, 500.0)?;
        assert_eq!(pin.port("out")?.at, Point::new(0.0, 562.0));

        let tc = &*AIST;
        let find = |layer: LayerSpec| {
            pin.cell
                .elems
                .iter()
                .filter(|e| e.layer == layer)
                .filter_map(|e| e.inner.bbox())
                .collect::<Vec<_>>()
        };
        let np = find(tc.layers.np.spec);
        assert_eq!(np.len(), 1);
        assert_abs_diff_eq!(np[0].p0.x, -14.5);
        assert_abs_diff_eq!(np[0].p0.y, 30.5);
        assert_abs_diff_eq!(np[0].p1.y, 531.5);
        let ct = find(tc.layers.ct2pn.spec);
        assert_abs_diff_eq!(ct[1].p0.x, 6.0);
        assert_abs_diff_eq!(ct[1].p1.x, 13.0);
        assert_abs_diff_eq!(ct[1].p0.y, 32.0);

        // No rib over the core.
        for rib in find(tc.layers.rib.spec) {
            assert!(rib.p1.x <= -0.255 + 1e-9 || rib.p0.x >= 0.255 - 1e-9);
        }
        let si = find(tc.layers.siwg.spec);
        let slab = si.iter().map(|r| r.width()).fold(0.0, f64::max);
        assert_abs_diff_eq!(slab, 30.0);

        let work_dir = test_work_dir("test_pin");
        lib.save_gds(&pin.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_pin_too_short() {
        let mut lib = PicLib::new(AIST.clone());
        assert!(matches!(
            draw_pin(&mut lib, 1.0),
            Err(LayoutError::Rule { .. })
        ));
    }
}
