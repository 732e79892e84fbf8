//! Coplanar waveguide structures for RF probe calibration.
//!
//! Every structure is a ground-signal-ground line between two three-pad
//! rows. The lower pad row sits at the origin with its pads above
//! `y = 0`; the line starts `pad_size + taper_length` higher.

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Heading, Orientation, Point, Polygon, Rect};
use crate::layout::{Cell, Instance, PicLib, Ptr, Repetition};
use crate::route::{Pose, Router};
use crate::tech::{CpwConfig, TechConfig, MMI_2X2};

use super::foundry::foundry_block;
use super::label::draw_label;
use super::pads::add_pad;
use super::pin::draw_pin;

pub const CPW_PAD: &str = "CPW_PAD";

const LOAD_TIN_WIDTH: f64 = 10.0;
/// Resistor length for about 100 ohm per resistor.
const LOAD_TIN_LENGTH: f64 = 37.0;
const LOAD_CONTACT_INSET: f64 = 2.0;
const LOAD_CONTACT_LENGTH: f64 = 4.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpwKind {
    Line,
    Short,
    Open,
    Load,
    /// A line beside two dummy PIN phase shifters joined by 2x2 MMIs.
    LoadPin,
    Thru,
}

impl CpwKind {
    fn prefix(&self) -> &'static str {
        match *self {
            CpwKind::Line => "CPW",
            CpwKind::Short => "SHORT",
            CpwKind::Open => "OPEN",
            CpwKind::Load => "LOAD",
            CpwKind::LoadPin => "LOAD_PIN",
            CpwKind::Thru => "THRU",
        }
    }
}

pub fn cpw_name(kind: CpwKind, length: f64) -> String {
    format!("{}_L{length}", kind.prefix())
}

/// Height of the pad row and its tapers; lines start here.
#[inline]
fn line_start(cpw: &CpwConfig) -> f64 {
    cpw.pad_size + cpw.taper_length
}

/// The x spans of the left ground, signal and right ground lines.
fn line_spans(cpw: &CpwConfig) -> [(f64, f64); 3] {
    let sig = cpw.sig_width / 2.0;
    let gnd_inner = sig + cpw.gap;
    let gnd_outer = gnd_inner + cpw.gnd_width;
    [(-gnd_outer, -gnd_inner), (-sig, sig), (gnd_inner, gnd_outer)]
}

/// Draws the three-pad row with tapers onto the CPW lines.
pub fn draw_cpw_pad(lib: &mut PicLib) -> LayoutResult<Ptr<Cell>> {
    let tc = lib.tech();
    let unit_name = format!("{CPW_PAD}_UNIT");
    let unit = lib.cell_or_insert_with(&unit_name, |_| {
        let mut cell = Cell::new(unit_name.as_str());
        let size = tc.cpw.pad_size;
        add_pad(
            &mut cell,
            &tc,
            Rect::new(Point::new(-size / 2.0, 0.0), Point::new(size / 2.0, size)),
            tc.cpw.pitch,
        )?;
        Ok(cell)
    })?;

    lib.cell_or_insert_with(CPW_PAD, |_| {
        let cpw = &tc.cpw;
        let mut cell = Cell::new(CPW_PAD);
        cell.add_inst(
            Instance::new(unit, Point::new(-cpw.pitch, 0.0)).with_repetition(Repetition::cols(3, cpw.pitch)),
        );
        let half = cpw.pad_size / 2.0;
        let top = line_start(cpw);
        for (i, (x0, x1)) in line_spans(cpw).into_iter().enumerate() {
            let x = (i as f64 - 1.0) * cpw.pitch;
            cell.add_polygon(
                tc.layers.met.spec,
                Polygon::new(vec![
                    Point::new(x - half, cpw.pad_size),
                    Point::new(x0, top),
                    Point::new(x1, top),
                    Point::new(x + half, cpw.pad_size),
                ]),
            );
        }
        Ok(cell)
    })
}

fn add_lines(cell: &mut Cell, tc: &TechConfig, length: f64, which: &[usize]) {
    let y0 = line_start(&tc.cpw);
    let spans = line_spans(&tc.cpw);
    for &i in which {
        let (x0, x1) = spans[i];
        cell.add_rect(
            tc.layers.met.spec,
            Rect::new(Point::new(x0, y0), Point::new(x1, y0 + length)),
        );
    }
}

/// Adds two TiN resistors from the signal line to either ground line,
/// centered on the middle of the line.
fn add_load_resistors(cell: &mut Cell, tc: &TechConfig, length: f64) {
    let layers = &tc.layers;
    let sig = tc.cpw.sig_width / 2.0;
    let mid = line_start(&tc.cpw) + length / 2.0;
    let w = LOAD_TIN_WIDTH;
    let c = LOAD_CONTACT_INSET;
    for sign in [-1.0, 1.0] {
        let y0 = if sign < 0.0 { mid - 1.5 * w } else { mid + 0.5 * w };
        let near = -sign * sig;
        let far = near + sign * LOAD_TIN_LENGTH;
        let tin = Rect::new(Point::new(near, y0), Point::new(far, y0 + w));
        cell.add_rect(layers.tin.spec, tin);
        cell.add_rect(
            layers.ct2tin.spec,
            Rect::new(Point::new(-sig + c, y0 + c), Point::new(sig - c, y0 + w - c)),
        );
        cell.add_rect(
            layers.ct2tin.spec,
            Rect::new(
                Point::new(far - sign * c, y0 + c),
                Point::new(far - sign * (c + LOAD_CONTACT_LENGTH), y0 + w - c),
            ),
        );
    }
}

/// PIN phase shifters with `length` um of doping stand beside the line,
/// one pad pitch out. Below and above them the two arms meet in 2x2 MMIs
/// whose free ports turn outward onto `x = ±pitch / 2`.
fn draw_load_pin(lib: &mut PicLib, name: &str, length: f64) -> LayoutResult<Ptr<Cell>> {
    let line = draw_cpw(lib, CpwKind::Line, length + 1.0)?;
    let pin = draw_pin(lib, length)?;
    let mmi = foundry_block(lib, MMI_2X2)?;
    let tc = lib.tech();

    lib.cell_or_insert_with(name, |_| {
        let cpw = &tc.cpw;
        let router = Router::new(&tc);
        let mut cell = Cell::new(name);
        cell.place(&line, Point::zero());

        let x = cpw.pitch - cpw.sig_width / 2.0 - cpw.gap / 2.0;
        let y = line_start(cpw);
        let left = pin.place_port_at("in", Pose::new(Point::new(-x, y), Heading::South), false)?;
        let right = pin.place_port_at("in", Pose::new(Point::new(x, y), Heading::South), true)?;
        let half = (mmi.port("out1")?.at.x - mmi.port("out0")?.at.x) / 2.0;
        let free = cpw.pitch / 2.0;

        let mut bottom_left = router.trace(left.port("in")?);
        bottom_left.turn_to(Heading::East)?.run_to(-half, Heading::South)?;
        let mut bottom_right = router.trace(right.port("in")?);
        bottom_right.turn_to(Heading::West)?.run_to(half, Heading::South)?;
        let bottom = mmi.place_port_at("out0", bottom_left.pose().reversed(), false)?;

        let mut top_left = router.trace(left.port("out")?);
        top_left.turn_to(Heading::East)?.run_to(-half, Heading::North)?;
        let mut top_right = router.trace(right.port("out")?);
        top_right.turn_to(Heading::West)?.run_to(half, Heading::North)?;
        let top = mmi.place_port_at("in0", top_left.pose().reversed(), false)?;

        for (mmi_at, arm) in [(bottom.port("out1")?, &bottom_right), (top.port("in1")?, &top_right)] {
            if !mmi_at.at.approx_eq(arm.at(), 1e-6) {
                return Err(LayoutError::Rule {
                    cell: name.to_string(),
                    rule: format!("PIN arm ends at {} away from the MMI", arm.at()),
                });
            }
        }

        let mut bottom_out0 = router.trace(bottom.port("in0")?);
        bottom_out0.turn_to(Heading::West)?.run_to(-free, Heading::South)?;
        let mut bottom_out1 = router.trace(bottom.port("in1")?);
        bottom_out1.turn_to(Heading::East)?.run_to(free, Heading::South)?;
        let mut top_out0 = router.trace(top.port("out0")?);
        top_out0.turn_to(Heading::West)?.run_to(-free, Heading::North)?;
        let mut top_out1 = router.trace(top.port("out1")?);
        top_out1.turn_to(Heading::East)?.run_to(free, Heading::North)?;

        for wg in [
            &bottom_left,
            &bottom_right,
            &top_left,
            &top_right,
            &bottom_out0,
            &bottom_out1,
            &top_out0,
            &top_out1,
        ] {
            wg.draw(&mut cell);
        }
        for placed in [left, right, bottom, top] {
            placed.add_to(&mut cell);
        }
        Ok(cell)
    })
}

/// Draws a calibration structure whose line is `length` um long.
pub fn draw_cpw(lib: &mut PicLib, kind: CpwKind, length: f64) -> LayoutResult<Ptr<Cell>> {
    let pad = draw_cpw_pad(lib)?;
    let name = cpw_name(kind, length);

    if kind == CpwKind::LoadPin {
        return draw_load_pin(lib, &name, length);
    }
    if kind == CpwKind::Thru {
        let line = draw_cpw(lib, CpwKind::Line, length + 1.0)?;
        let tc = lib.tech();
        let label = draw_label(lib, &format!("{name}_label"), "T", tc.label.size, tc.layers.met.spec)?;
        let (w, h) = label.size();
        return lib.cell_or_insert_with(&name, |_| {
            let mut cell = Cell::new(name.as_str());
            cell.place(&line, Point::zero());
            cell.add_inst(
                Instance::new(
                    label,
                    Point::new(2.0 * tc.cpw.pitch - h / 2.0, tc.cpw.taper_length + length / 2.0 - w / 2.0),
                )
                .rotated(-90.0),
            );
            Ok(cell)
        });
    }

    lib.cell_or_insert_with(&name, |lib| {
        let tc = lib.tech();
        let mut cell = Cell::new(name.as_str());
        cell.place(&pad, Point::zero());
        match kind {
            CpwKind::Line | CpwKind::Thru | CpwKind::LoadPin => add_lines(&mut cell, &tc, length, &[0, 1, 2]),
            CpwKind::Open => add_lines(&mut cell, &tc, length, &[0, 2]),
            CpwKind::Load => {
                add_lines(&mut cell, &tc, length, &[0, 1, 2]);
                add_load_resistors(&mut cell, &tc, length);
            }
            CpwKind::Short => {
                let y0 = line_start(&tc.cpw);
                let spans = line_spans(&tc.cpw);
                cell.add_rect(
                    tc.layers.met.spec,
                    Rect::new(Point::new(spans[0].0, y0), Point::new(spans[2].1, y0 + length)),
                );
            }
        }
        cell.add_inst(
            Instance::new(pad, Point::new(0.0, 2.0 * line_start(&tc.cpw) + length))
                .with_orientation(Orientation::reflected(0.0)),
        );
        Ok(cell)
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::AIST;
    use crate::tests::test_work_dir;

    #[test]
    fn test_line_spans() {
        let spans = line_spans(&AIST.cpw);
        assert_eq!(spans[0], (-54.0, -19.0));
        assert_eq!(spans[1], (-4.0, 4.0));
        assert_eq!(line_start(&AIST.cpw), 160.0);
    }

    #[test]
    fn test_cpw_line() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let cell = draw_cpw(&mut lib, CpwKind::Line, 1000.0)?;
        assert_eq!(cell.name.as_str(), "CPW_L1000");
        let bbox = cell.bbox().unwrap();
        assert_abs_diff_eq!(bbox.p0.y, 0.0);
        assert_abs_diff_eq!(bbox.p1.y, 1320.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bbox.width(), 360.0, epsilon = 1e-9);

        let work_dir = test_work_dir("test_cpw_line");
        lib.save_gds(&cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_cpw_load() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let cell = draw_cpw(&mut lib, CpwKind::Load, 50.0)?;
        let tin: Vec<_> = cell
            .elems
            .iter()
            .filter(|e| e.layer == AIST.layers.tin.spec)
            .filter_map(|e| e.inner.bbox())
            .collect();
        assert_eq!(tin.len(), 2);
        assert_abs_diff_eq!(tin[0].p0.x, -33.0);
        assert_abs_diff_eq!(tin[0].p1.y, 180.0);
        assert_abs_diff_eq!(tin[1].p1.x, 33.0);
        assert_abs_diff_eq!(tin[1].p0.y, 190.0);
        let contacts = cell.elems.iter().filter(|e| e.layer == AIST.layers.ct2tin.spec).count();
        assert_eq!(contacts, 4);
        Ok(())
    }

    #[test]
    fn test_cpw_load_pin() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let cell = draw_cpw(&mut lib, CpwKind::LoadPin, 50.0)?;
        assert_eq!(cell.name.as_str(), "LOAD_PIN_L50");
        assert!(lib.get("CPW_L51").is_some());
        let count = |name: &str| cell.insts.iter().filter(|i| i.cell.name.as_str() == name).count();
        assert_eq!(count("CPW_L51"), 1);
        assert_eq!(count("PIN_L50"), 2);
        assert_eq!(count(MMI_2X2), 2);

        // The PINs sit one pad pitch out, less half the signal and gap.
        let pins: Vec<_> = cell
            .insts
            .iter()
            .filter(|i| i.cell.name.as_str() == "PIN_L50")
            .map(|i| i.loc)
            .collect();
        assert_abs_diff_eq!(pins[0].x, -113.5, epsilon = 1e-9);
        assert_abs_diff_eq!(pins[1].x, 113.5, epsilon = 1e-9);
        // Eight arms, none of them empty.
        assert!(cell.elems.iter().filter(|e| e.layer == AIST.layers.siwg.spec).count() >= 8);

        let work_dir = test_work_dir("test_cpw_load_pin");
        lib.save_gds(&cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_cpw_set() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let mut top = Cell::new("cpw_set");
        for (i, kind) in [CpwKind::Short, CpwKind::Open, CpwKind::Load, CpwKind::LoadPin, CpwKind::Thru]
            .into_iter()
            .enumerate()
        {
            let cell = draw_cpw(&mut lib, kind, 50.0)?;
            top.place(&cell, Point::new(500.0 * i as f64, 0.0));
        }
        assert!(lib.get("CPW_L51").is_some());
        let top = lib.add_cell(top)?;

        let work_dir = test_work_dir("test_cpw_set");
        lib.save_gds(&top, out_gds(work_dir, "layout"))?;
        Ok(())
    }
}
