//! Passive test pattern on the right chip edge.
//!
//! The pattern origin lies on the chip edge. Seven SSCs at `ssc.pitch`
//! start one pitch above it: two loopback pairs around a 1x2 MMI whose
//! input and outputs run to the middle three. Three more SSCs at a minor
//! pitch below feed grating couplers.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::LayoutResult;
use crate::geometry::{Heading, Point};
use crate::layout::text::draw_text;
use crate::layout::{Cell, Instance, PicLib, Ptr, Repetition};
use crate::route::{Pose, Router};
use crate::tech::{FOUNDRY_GC, MMI_1X2};

use super::foundry::foundry_block;
use super::gc::{draw_gc, draw_gc_without_nodmy, GcParams};
use super::loopback::draw_loopback;
use super::ssc::{draw_ssc, Side};
use super::EdgePort;

const MAIN_ROWS: usize = 7;
const MINOR_ROWS: usize = 3;
/// Offset of the first label from its SSC.
const LABEL_RISE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
pub struct PassiveParams {
    #[builder(default = "1.0")]
    pub loop_straight_length: f64,
    /// Pitch of the grating coupler SSC rows.
    #[builder(default = "40.0")]
    pub minor_pitch: f64,
    /// Offset of the minor rows below the pattern origin.
    #[builder(default = "50.0")]
    pub minor_offset: f64,
    /// Feed length in front of the foundry grating coupler.
    #[builder(default = "10.0")]
    pub foundry_gc_feed: f64,
    /// Feed length in front of the drawn grating couplers.
    #[builder(default = "100.0")]
    pub gc_feed: f64,
    #[builder(default)]
    pub gc: GcParams,
}

impl PassiveParams {
    #[inline]
    pub fn builder() -> PassiveParamsBuilder {
        PassiveParamsBuilder::default()
    }
}

impl Default for PassiveParams {
    fn default() -> Self {
        Self {
            loop_straight_length: 1.0,
            minor_pitch: 40.0,
            minor_offset: 50.0,
            foundry_gc_feed: 10.0,
            gc_feed: 100.0,
            gc: GcParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassivePattern {
    pub cell: Ptr<Cell>,
    /// The seven main SSCs, bottom to top.
    pub ports: Vec<EdgePort>,
}

pub fn draw_passive(lib: &mut PicLib, name: &str, params: &PassiveParams) -> LayoutResult<PassivePattern> {
    let tc = lib.tech();
    let pitch = tc.ssc.pitch;
    let wg_x = -tc.ssc.reach();
    let row = |i: usize| pitch * (i + 1) as f64;
    let minor_row = |k: usize| -params.minor_offset + params.minor_pitch * (k + 1) as f64;

    let mut cell = Cell::new(name);
    let router = Router::new(&tc);

    let ssc = draw_ssc(lib, Side::Right)?;
    cell.add_inst(
        Instance::new(ssc.cell.clone(), Point::new(0.0, row(0))).with_repetition(Repetition::rows(MAIN_ROWS, pitch)),
    );
    cell.add_inst(
        Instance::new(ssc.cell.clone(), Point::new(0.0, minor_row(0)))
            .with_repetition(Repetition::rows(MINOR_ROWS, params.minor_pitch)),
    );

    let lb = draw_loopback(lib, params.loop_straight_length)?;
    for top in [1, MAIN_ROWS - 1] {
        lb.place_port_at("a", Pose::new(Point::new(wg_x, row(top)), Heading::East), false)?
            .add_to(&mut cell);
    }

    // 1x2 MMI: input on row 2, right output on row 3, left output on row 4.
    let mut feed = router.trace_from(Point::new(wg_x, row(2)), Heading::West);
    feed.horizontal(-10.0)?.turn_to(Heading::North)?.vertical(30.0)?;
    let mmi = foundry_block(lib, MMI_1X2)?.place_port_at("in", feed.pose().reversed(), false)?;
    let mut right = router.trace(mmi.port("out1")?);
    right.run_to(row(3), Heading::East)?.finish_at(Point::new(wg_x, row(3)))?;
    let mut left = router.trace(mmi.port("out0")?);
    left.turn_to(Heading::West)?
        .turn_to(Heading::North)?
        .run_to(row(4), Heading::East)?
        .finish_at(Point::new(wg_x, row(4)))?;
    mmi.add_to(&mut cell);
    for wg in [&feed, &right, &left] {
        wg.draw(&mut cell);
    }

    // Grating couplers, top to bottom: foundry, drawn, drawn without NODMY.
    let mut gc_feed = |y: f64, length: f64| -> LayoutResult<Pose> {
        let mut wg = router.trace_from(Point::new(wg_x, y), Heading::West);
        wg.horizontal(-length)?;
        wg.draw(&mut cell);
        Ok(wg.pose().reversed())
    };
    let foundry_at = gc_feed(minor_row(2), params.foundry_gc_feed)?;
    let gc_at = gc_feed(minor_row(1), params.gc_feed)?;
    let bare_at = gc_feed(minor_row(0), params.gc_feed)?;
    for (block, at) in [
        (foundry_block(lib, FOUNDRY_GC)?, foundry_at),
        (draw_gc(lib, &params.gc)?, gc_at),
        (draw_gc_without_nodmy(lib, &params.gc)?, bare_at),
    ] {
        block.place_port_at("wg", at, false)?.add_to(&mut cell);
    }

    let nets = ["loopback", "loopback", "mmi_in", "mmi_out_r", "mmi_out_l", "loopback", "loopback"];
    let suffixes = ["U", "U", "o", "iR", "iL", "U", "U"];
    let mut ports = Vec::with_capacity(MAIN_ROWS);
    for (i, (net, suffix)) in nets.iter().zip(suffixes).enumerate() {
        let label = format!("{i}{suffix}");
        draw_text(
            &mut cell,
            tc.layers.met.spec,
            &label,
            tc.label.port_size,
            Point::new(wg_x, row(i) + LABEL_RISE),
        )?;
        ports.push(EdgePort {
            index: i,
            label,
            net: net.to_string(),
            at: Point::new(0.0, row(i)),
        });
    }

    let cell = lib.add_cell(cell)?;
    Ok(PassivePattern { cell, ports })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::AIST;
    use crate::tests::test_work_dir;

    #[test]
    fn test_passive() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let params = PassiveParams::builder().build().unwrap();
        let pattern = draw_passive(&mut lib, "passive", &params)?;

        let labels: Vec<_> = pattern.ports.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["0U", "1U", "2o", "3iR", "4iL", "5U", "6U"]);
        assert_abs_diff_eq!(pattern.ports[6].at.y, 7.0 * 127.0);
        assert!(lib.get("GC_T20P0.6A35L10_woNODMY").is_some());
        assert!(lib.get("loopback_1").is_some());

        let bbox = pattern.cell.bbox().unwrap();
        assert_abs_diff_eq!(bbox.p1.x, 50.0, epsilon = 1e-9);
        // The foundry grating coupler reaches furthest into the chip.
        assert_abs_diff_eq!(bbox.p0.x, -150.0 - 10.0 - 217.0, epsilon = 1e-9);

        let work_dir = test_work_dir("test_passive");
        lib.save_gds(&pattern.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }
}
