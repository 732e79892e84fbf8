//! TiN heaters and series terminations.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::LayoutResult;
use crate::geometry::{Heading, Point, Rect};
use crate::layout::{Cell, PicLib, Ptr};
use crate::route::{Pose, Router};
use crate::tech::TechConfig;

use super::pads::{add_pad_row, pad_x, Net, PADS_PER_ROW};
use super::Block;

const HEATER_PAD_SIZE: f64 = 20.0;
const HEATER_CONTACT_INSET: f64 = 3.0;

const TERM_CONTACT_LENGTH: f64 = 10.0;
/// Inset of the termination contacts from the resistor edges.
const TERM_CONTACT_INSET: f64 = 3.0;
/// Overlap of the resistor onto the pad metal below it.
const TERM_OVERLAP: f64 = 16.0;

/// Draws a TiN heater over a straight waveguide running north from the
/// origin. The contact pads sit on opposite sides at opposite ends.
pub fn draw_tin(lib: &mut PicLib, length: f64, width: f64) -> LayoutResult<Block> {
    let name = format!("TIN_L{length}W{width}");
    let cell = lib.cell_or_insert_with(&name, |lib| {
        let tc = lib.tech();
        let layers = &tc.layers;
        let mut cell = Cell::new(name.as_str());
        let router = Router::new(&tc);

        let mut wg = router.trace_from(Point::zero(), Heading::North);
        wg.straight(length)?;
        wg.draw(&mut cell);
        let mut heater = router.trace_from(Point::zero(), Heading::North);
        heater.set_layer(layers.tin.spec).set_width(width)?;
        heater.straight(length)?;
        heater.draw(&mut cell);

        let s = HEATER_PAD_SIZE;
        let pads = [
            Rect::new(Point::new(-width / 2.0 - s, 0.0), Point::new(-width / 2.0, s)),
            Rect::new(Point::new(width / 2.0, length - s), Point::new(width / 2.0 + s, length)),
        ];
        for pad in pads {
            cell.add_rect(layers.tin.spec, pad);
            cell.add_rect(layers.ct2tin.spec, pad.expand(-HEATER_CONTACT_INSET));
            cell.add_rect(layers.met.spec, pad);
        }
        Ok(cell)
    })?;
    Ok(Block::new(cell)
        .with_port("in", Pose::new(Point::zero(), Heading::South))
        .with_port("out", Pose::new(Point::new(0.0, length), Heading::North)))
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
pub struct TinTermParams {
    /// Resistor width across the signal line.
    #[builder(default = "60.0")]
    pub tin_width: f64,
    #[builder(default = "90.0")]
    pub tin_length: f64,
}

impl TinTermParams {
    #[inline]
    pub fn builder() -> TinTermParamsBuilder {
        TinTermParamsBuilder::default()
    }

    pub fn name(&self) -> String {
        format!("TIN_TERM_W{}L{}", self.tin_width, self.tin_length)
    }

    /// Vertical offset that stacks the termination under a pad row drawn
    /// at the same origin, its ground and signal metal meeting the pads.
    pub fn stack_offset(&self, tc: &TechConfig) -> f64 {
        -(tc.rf_pad.pad_size() + self.tin_length - 2.0 * TERM_OVERLAP)
    }
}

impl Default for TinTermParams {
    fn default() -> Self {
        Self {
            tin_width: 60.0,
            tin_length: 90.0,
        }
    }
}

/// Draws a GSGSG pad row whose signal pads run through TiN resistors. The
/// ground pads extend up to the top of the resistors.
pub fn draw_tin_series_term(lib: &mut PicLib, params: &TinTermParams) -> LayoutResult<Ptr<Cell>> {
    let name = params.name();
    lib.cell_or_insert_with(&name, |lib| {
        let tc = lib.tech();
        let layers = &tc.layers;
        let rf = &tc.rf_pad;
        let mut cell = Cell::new(name.as_str());
        add_pad_row(&mut cell, &tc)?;

        let w = params.tin_width;
        let l = params.tin_length;
        let pad_top = -rf.taper_length;
        let contact_width = w - 2.0 * TERM_CONTACT_INSET;
        let shift = l - TERM_OVERLAP;

        for i in 0..PADS_PER_ROW {
            let x = pad_x(&tc, i);
            match Net::gsgsg(i) {
                Net::Sig => {
                    let resistor_bottom = pad_top - TERM_OVERLAP;
                    cell.add_rect(
                        layers.tin.spec,
                        Rect::new(Point::new(x - w / 2.0, resistor_bottom), Point::new(x + w / 2.0, resistor_bottom + l)),
                    );
                    let contact = Rect::new(
                        Point::new(x - contact_width / 2.0, pad_top - TERM_CONTACT_INSET - TERM_CONTACT_LENGTH),
                        Point::new(x + contact_width / 2.0, pad_top - TERM_CONTACT_INSET),
                    );
                    cell.add_rect(layers.ct2tin.spec, contact);
                    cell.add_rect(layers.ct2tin.spec, contact.translate(Point::new(0.0, shift)));
                }
                Net::Gnd => {
                    let half = rf.pad_size() / 2.0;
                    cell.add_rect(
                        layers.met.spec,
                        Rect::new(Point::new(x - half, pad_top), Point::new(x + half, pad_top + l - 2.0 * TERM_OVERLAP)),
                    );
                }
            }
        }
        Ok(cell)
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::paths::out_gds;
    use crate::tech::{LayerSpec, AIST};
    use crate::tests::test_work_dir;

    fn rects(cell: &Cell, layer: LayerSpec) -> Vec<Rect> {
        cell.elems
            .iter()
            .filter(|e| e.layer == layer)
            .filter_map(|e| e.inner.bbox())
            .collect()
    }

    #[test]
    fn test_tin_heater() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let tin = draw_tin(&mut lib, 200.0, 4.0)?;
        let ct = rects(&tin.cell, AIST.layers.ct2tin.spec);
        assert_eq!(ct.len(), 2);
        assert_abs_diff_eq!(ct[0].p0.x, -19.0);
        assert_abs_diff_eq!(ct[1].p1.y, 197.0);
        assert_eq!(tin.port("out")?.at, Point::new(0.0, 200.0));
        Ok(())
    }

    #[test]
    fn test_tin_series_term() -> LayoutResult<()> {
        let mut lib = PicLib::new(AIST.clone());
        let params = TinTermParams::builder().build().unwrap();
        let cell = draw_tin_series_term(&mut lib, &params)?;

        let ct = rects(&cell, AIST.layers.ct2tin.spec);
        assert_eq!(ct.len(), 4);
        assert_abs_diff_eq!(ct[0].width(), 54.0);
        assert_abs_diff_eq!(ct[0].p0.y, -58.0);
        assert_abs_diff_eq!(ct[1].p0.y, 16.0);
        let tin = rects(&cell, AIST.layers.tin.spec);
        assert_eq!(tin.len(), 2);
        assert_abs_diff_eq!(tin[0].p0.y, -61.0);
        assert_abs_diff_eq!(tin[0].center().x, -125.0);
        assert_abs_diff_eq!(params.stack_offset(&AIST), -174.0);

        let work_dir = test_work_dir("test_tin_series_term");
        lib.save_gds(&cell, out_gds(work_dir, "layout"))?;
        Ok(())
    }
}
