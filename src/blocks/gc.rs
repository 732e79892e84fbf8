//! Focusing grating couplers.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::LayoutResult;
use crate::geometry::{Heading, Point, Polygon, Rect};
use crate::layout::{Cell, PicLib};
use crate::route::Pose;

use super::Block;

/// Edge length of the no-dummy-fill box over the grating.
const NODMY_SIZE: f64 = 30.0;
/// Extra arc length added to both ends of every grating line.
const RIB_OVERHANG: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
pub struct GcParams {
    #[builder(default = "20")]
    pub grating_num: usize,
    /// Grating period in um. Lines are drawn at 50% duty.
    #[builder(default = "0.6")]
    pub grating_pitch: f64,
    /// Full opening angle of the taper in degrees.
    #[builder(default = "35.0")]
    pub angle_deg: f64,
    #[builder(default = "10.0")]
    pub taper_length: f64,
}

impl GcParams {
    #[inline]
    pub fn builder() -> GcParamsBuilder {
        GcParamsBuilder::default()
    }

    pub fn name(&self) -> String {
        format!(
            "GC_T{}P{}A{}L{}",
            self.grating_num, self.grating_pitch, self.angle_deg, self.taper_length
        )
    }
}

impl Default for GcParams {
    fn default() -> Self {
        Self {
            grating_num: 20,
            grating_pitch: 0.6,
            angle_deg: 35.0,
            taper_length: 10.0,
        }
    }
}

/// Draws a grating coupler fed from the west through port `wg` at the origin.
pub fn draw_gc(lib: &mut PicLib, params: &GcParams) -> LayoutResult<Block> {
    let name = params.name();
    let cell = lib.cell_or_insert_with(&name, |lib| {
        let tc = lib.tech();
        let mut cell = Cell::new(name.as_str());
        let wg_width = tc.waveguide.width;
        let half_angle = params.angle_deg / 2.0;

        // The taper sector has its apex where its width equals zero; the
        // part narrower than the waveguide is cut away.
        let taper_start = wg_width / 2.0 / half_angle.to_radians().tan();
        let radius = taper_start + params.taper_length + params.grating_pitch * params.grating_num as f64;
        let sector = Polygon::sector(Point::new(-taper_start, 0.0), radius, -half_angle, half_angle);
        let feed = Rect::new(Point::new(-taper_start, -wg_width / 2.0), Point::new(0.0, wg_width / 2.0));
        for piece in sector.subtract_rect(&feed) {
            cell.add_polygon(tc.layers.siwg.spec, piece);
        }

        let rib_width = params.grating_pitch / 2.0;
        for i in 0..params.grating_num {
            let r = params.taper_length + params.grating_pitch * i as f64 + rib_width / 2.0;
            let span = half_angle + (RIB_OVERHANG / r).to_degrees();
            cell.add_polygon(
                tc.layers.rib.spec,
                Polygon::annular_sector(Point::zero(), r, rib_width, span, -span),
            );
        }

        cell.add_rect(
            tc.layers.nodmy.spec,
            Rect::new(Point::new(0.0, -NODMY_SIZE / 2.0), Point::new(NODMY_SIZE, NODMY_SIZE / 2.0)),
        );
        Ok(cell)
    })?;
    Ok(Block::new(cell).with_port("wg", Pose::new(Point::zero(), Heading::West)))
}

/// The same grating coupler without its no-dummy-fill box.
pub fn draw_gc_without_nodmy(lib: &mut PicLib, params: &GcParams) -> LayoutResult<Block> {
    let gc = draw_gc(lib, params)?;
    let name = format!("{}_woNODMY", gc.name());
    let nodmy = lib.tech.layers.nodmy.spec;
    let cell = lib.cell_or_insert_with(&name, |_| Ok(gc.cell.without_layer(nodmy, name.as_str())))?;
    Ok(Block {
        cell,
        ports: gc.ports,
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
    fn test_gc() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let params = GcParams::builder().build().unwrap();
        assert_eq!(params.name(), "GC_T20P0.6A35L10");
        let gc = draw_gc(&mut lib, &params)?;

        let tc = &*AIST;
        let si: Vec<_> = gc.cell.elems.iter().filter(|e| e.layer == tc.layers.siwg.spec).collect();
        assert_eq!(si.len(), 1);
        // The taper starts exactly one waveguide width wide.
        let bbox = si[0].inner.bbox().unwrap();
        assert_abs_diff_eq!(bbox.p0.x, 0.0, epsilon = 1e-9);
        let ribs = gc.cell.elems.iter().filter(|e| e.layer == tc.layers.rib.spec).count();
        assert_eq!(ribs, 20);

        let work_dir = test_work_dir("test_gc");
        lib.save_gds(&gc.cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }

    #[test]
    fn test_gc_without_nodmy() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let params = GcParams::builder().grating_num(10).build().unwrap();
        let gc = draw_gc_without_nodmy(&mut lib, &params)?;
        assert_eq!(gc.name().as_str(), "GC_T10P0.6A35L10_woNODMY");
        let nodmy = AIST.layers.nodmy.spec;
        assert!(gc.cell.elems.iter().all(|e| e.layer != nodmy));
        assert!(lib.get("GC_T10P0.6A35L10").is_some());
        Ok(())
    }
}
