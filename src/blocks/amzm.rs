//! Asymmetric Mach-Zehnder modulators.
//!
//! The splitter sits at the origin with its inputs facing west. Both arms
//! run north through a PIN phase shifter, the upper arm (leaving the
//! splitter on the north side) through a delay loop, and meet again at a
//! combiner whose outputs face east. The arms are one RF pad pitch apart
//! so that each PIN lies under the gap between two probe pads.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Heading, Orientation, Point, Rect};
use crate::layout::{Cell, Instance, PicLib, Ptr, Repetition};
use crate::route::{Pose, Router};
use crate::tech::{MMI_1X2, MMI_2X2};

use super::foundry::foundry_block;
use super::label::draw_label;
use super::pads::{add_pad, draw_pad_structure, PADS_PER_ROW};
use super::pin::{draw_pin, slab_length, SLAB_OFFSET};
use super::tin::{draw_tin_series_term, TinTermParams};
use super::{Block, Port};

/// Center of the length label west of the pad array, for a device with no
/// doped length. The label moves up by half the PIN length.
const PAD_ARRAY_LABEL_CENTER: Point = Point::new(-235.0, 120.0);
/// Center of the length label east of the pad structure, as above.
const PAD_STRUCTURE_LABEL_CENTER: Point = Point::new(420.0, 40.0);

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmzmVariant {
    /// 2x2 MMIs with a pad array over the arms.
    #[default]
    Plain,
    /// 2x2 MMIs with a pad pair and a TiN series termination.
    Term,
    /// 1x2 MMIs for grating coupler access, with a pad pair.
    Gc,
}

impl AmzmVariant {
    fn prefix(&self) -> &'static str {
        match *self {
            AmzmVariant::Plain => "AMZM",
            AmzmVariant::Term => "AMZM_TERM",
            AmzmVariant::Gc => "AMZM_GC",
        }
    }

    fn coupler(&self) -> &'static str {
        match *self {
            AmzmVariant::Gc => MMI_1X2,
            _ => MMI_2X2,
        }
    }

    /// Port of the combiner that joins the upper arm.
    fn combiner_upper(&self) -> &'static str {
        match *self {
            AmzmVariant::Gc => "out1",
            _ => "in0",
        }
    }

    fn combiner_lower(&self) -> &'static str {
        match *self {
            AmzmVariant::Gc => "out0",
            _ => "in1",
        }
    }

    /// Names of the optical ports of a device of this variant.
    pub fn port_names(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match *self {
            AmzmVariant::Gc => (&["in"], &["out"]),
            _ => (&["in0", "in1"], &["out0", "out1"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
pub struct AmzmParams {
    /// Doped length of each PIN phase shifter.
    pub pin_length: f64,
    #[builder(default)]
    #[serde(default)]
    pub variant: AmzmVariant,
    /// Extra length of the upper arm, folded into a loop.
    #[builder(default = "100.0")]
    #[serde(default = "default_delay_length")]
    pub delay_length: f64,
}

fn default_delay_length() -> f64 {
    100.0
}

impl AmzmParams {
    #[inline]
    pub fn builder() -> AmzmParamsBuilder {
        AmzmParamsBuilder::default()
    }

    pub fn name(&self) -> String {
        format!("{}_L{}_D{}", self.variant.prefix(), self.pin_length, self.delay_length)
    }
}

/// Draws an AMZM. Inputs face west and outputs face east; see
/// [`AmzmVariant::port_names`].
pub fn draw_amzm(lib: &mut PicLib, params: &AmzmParams) -> LayoutResult<Block> {
    let tc = lib.tech();
    let name = params.name();
    let variant = params.variant;
    let pitch = tc.rf_pad.pitch;
    let mut cell = Cell::new(name.as_str());
    let mut ports = Vec::new();
    let router = Router::new(&tc);

    let coupler = foundry_block(lib, variant.coupler())?;
    let splitter = coupler.place(Point::zero(), Orientation::rotated(-90.0));
    let upper_out = splitter.port("out0")?;
    let lower_out = splitter.port("out1")?;
    let spacing = upper_out.at.y - lower_out.at.y;
    ports.extend(
        splitter
            .add_to(&mut cell)
            .into_iter()
            .filter(|p| !p.name.starts_with("out")),
    );

    let mut upper = router.trace(upper_out);
    upper.turn_to(Heading::North)?;
    let mut lower = router.trace(lower_out);
    lower.horizontal(pitch)?.turn_to(Heading::North)?.vertical(spacing)?;

    let pin = draw_pin(lib, params.pin_length)?;
    let bottom_left = upper.at();
    let bottom_right = lower.at();
    let pin_upper = pin.place_port_at("in", Pose::new(bottom_left, Heading::South), false)?;
    let pin_lower = pin.place_port_at("in", Pose::new(bottom_right, Heading::South), true)?;

    let mut upper_top = router.trace(pin_upper.port("out")?);
    upper_top
        .vertical(spacing)?
        .turn_to(Heading::West)?
        .turn_to(Heading::South)?
        .turn_to(Heading::West)?
        .horizontal(-params.delay_length / 2.0)?
        .turn_to(Heading::North)?
        .vertical(tc.waveguide.routing_pitch)?
        .turn_to(Heading::East)?
        .horizontal(params.delay_length / 2.0 + pitch)?;
    let mut lower_top = router.trace(pin_lower.port("out")?);
    lower_top
        .turn_to(Heading::West)?
        .turn_to(Heading::South)?
        .turn_to(Heading::West)?
        .turn_to(Heading::North)?
        .vertical(tc.waveguide.routing_pitch)?
        .turn_to(Heading::East)?;

    pin_upper.add_to(&mut cell);
    pin_lower.add_to(&mut cell);

    let combiner = coupler.place_port_at(
        variant.combiner_upper(),
        Pose::new(upper_top.at(), Heading::West),
        false,
    )?;
    if !combiner.port(variant.combiner_lower())?.at.approx_eq(lower_top.at(), 1e-6) {
        return Err(LayoutError::Rule {
            cell: name,
            rule: format!("lower arm ends at {} away from the combiner", lower_top.at()),
        });
    }
    for p in combiner.add_to(&mut cell) {
        match (variant, p.name.as_str()) {
            (AmzmVariant::Gc, "in") => ports.push(Port::new("out", p.pose)),
            (AmzmVariant::Gc, _) => {}
            (_, "out0" | "out1") => ports.push(p),
            _ => {}
        }
    }

    for wg in [&upper, &lower, &upper_top, &lower_top] {
        wg.draw(&mut cell);
    }

    let label = draw_label(
        lib,
        &format!("{name}_label"),
        &format!("{:.0}", params.pin_length),
        tc.label.size,
        tc.layers.met.spec,
    )?;
    let (label_w, label_h) = label.size();
    // Lower left corner of the turned label, centered on `center` raised
    // by half the PIN length.
    let label_origin = |center: Point, rise: f64| {
        Point::new(center.x - label_h / 2.0, center.y + rise - label_w / 2.0)
    };
    let mid_x = (bottom_left.x + bottom_right.x) / 2.0;
    let slab_bottom = bottom_left.y + SLAB_OFFSET;
    let half_length = params.pin_length / 2.0;

    match variant {
        AmzmVariant::Plain => {
            let gap = tc.rf_pad.gap;
            let pad = Rect::new(
                Point::new(bottom_left.x + gap / 2.0, slab_bottom),
                Point::new(bottom_right.x - gap / 2.0, slab_bottom + slab_length(params.pin_length)),
            );
            let pad_name = format!("{name}_PIN_PAD");
            let pad_cell = lib.cell_or_insert_with(&pad_name, |_| {
                let mut pc = Cell::new(pad_name.as_str());
                add_pad(&mut pc, &tc, pad.translate(-pad.p0), pitch)?;
                Ok(pc)
            })?;
            let first = (PADS_PER_ROW / 2) as f64 * pitch;
            cell.add_inst(
                Instance::new(pad_cell, pad.p0 - Point::new(first, 0.0))
                    .with_repetition(Repetition::cols(PADS_PER_ROW, pitch)),
            );
            cell.add_inst(
                Instance::new(label, label_origin(PAD_ARRAY_LABEL_CENTER, half_length))
                    .rotated(-90.0),
            );
        }
        AmzmVariant::Term | AmzmVariant::Gc => {
            let origin = Point::new(mid_x, bottom_left.y + tc.rf_pad.taper_end);
            let pads = draw_pad_structure(lib, &format!("{name}_PAD"), params.pin_length + 1.0)?;
            cell.place(&pads, origin);
            if variant == AmzmVariant::Term {
                let term = TinTermParams::default();
                let term_cell = draw_tin_series_term(lib, &term)?;
                cell.place(&term_cell, origin + Point::new(0.0, term.stack_offset(&tc)));
            }
            cell.add_inst(
                Instance::new(label, label_origin(PAD_STRUCTURE_LABEL_CENTER, half_length))
                    .rotated(90.0),
            );
        }
    }

    let cell: Ptr<Cell> = lib.add_cell(cell)?;
    log::debug!("drew {} with ports {:?}", cell.name, ports.iter().map(|p| &p.name).collect::<Vec<_>>());
    Ok(Block { cell, ports })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::AIST;
    use crate::tests::test_work_dir;

    fn amzm(variant: AmzmVariant) -> AmzmParams {
        AmzmParams::builder()
            .pin_length(500.0)
            .variant(variant)
            .build()
            .unwrap()
    }

    #[test]
    fn test_amzm_plain() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let params = amzm(AmzmVariant::Plain);
        assert_eq!(params.name(), "AMZM_L500_D100");
        let block = draw_amzm(&mut lib, &params)?;

        let in0 = block.port("in0")?;
        assert_eq!(in0.heading, Heading::West);
        assert_abs_diff_eq!(in0.at.y, 0.55, epsilon = 1e-9);
        assert_abs_diff_eq!(block.port("in1")?.at.y, -0.55, epsilon = 1e-9);

        let out0 = block.port("out0")?;
        let out1 = block.port("out1")?;
        assert_eq!(out0.heading, Heading::East);
        assert_abs_diff_eq!(out0.at.x, 186.832, epsilon = 1e-6);
        assert_abs_diff_eq!(out0.at.y, 500.0 + 88.85, epsilon = 1e-6);
        assert_abs_diff_eq!(out0.at.y - out1.at.y, 1.1, epsilon = 1e-6);

        let work_dir = test_work_dir("test_amzm_plain");
        lib.save_gds(&block.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_amzm_term() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let block = draw_amzm(&mut lib, &amzm(AmzmVariant::Term))?;
        assert!(lib.get("AMZM_TERM_L500_D100_PAD").is_some());
        assert!(lib.get(&TinTermParams::default().name()).is_some());
        assert_eq!(block.ports.len(), 4);

        let work_dir = test_work_dir("test_amzm_term");
        lib.save_gds(&block.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_amzm_gc() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let block = draw_amzm(&mut lib, &amzm(AmzmVariant::Gc))?;
        let names: Vec<_> = block.ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["in", "out"]);
        let out = block.port("out")?;
        assert_eq!(out.heading, Heading::East);
        assert_eq!(block.port("in")?.at, Point::zero());
        assert!(lib.get("AMZM_GC_L500_D100_PAD").is_some());
        Ok(())
    }

    #[test]
    fn test_amzm_label_tracks_pin_length() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let mut label_locs = Vec::new();
        for pin_length in [200.0, 500.0] {
            let params = AmzmParams::builder().pin_length(pin_length).build().unwrap();
            let block = draw_amzm(&mut lib, &params)?;
            let label_name = format!("{}_label", params.name());
            let label = lib.get(&label_name).unwrap();
            let (w, h) = label.size();
            let inst = block
                .cell
                .insts
                .iter()
                .find(|i| i.cell.name.as_str() == label_name)
                .unwrap();
            assert_abs_diff_eq!(inst.loc.x, PAD_ARRAY_LABEL_CENTER.x - h / 2.0, epsilon = 1e-9);
            assert_abs_diff_eq!(
                inst.loc.y,
                PAD_ARRAY_LABEL_CENTER.y + pin_length / 2.0 - w / 2.0,
                epsilon = 1e-9
            );
            label_locs.push(inst.loc.y + w / 2.0);
        }
        assert_abs_diff_eq!(label_locs[1] - label_locs[0], 150.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_amzm_redraw() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let a = draw_amzm(&mut lib, &amzm(AmzmVariant::Plain))?;
        let b = draw_amzm(&mut lib, &amzm(AmzmVariant::Plain))?;
        assert!(Ptr::ptr_eq(&a.cell, &b.cell));
        Ok(())
    }
}
