//! RF probe pads.
//!
//! A pad row is five GSGSG pads on `rf_pad.pitch`, centered on the cell
//! origin and hanging below `y = -taper_length`. Tapers join each pad to
//! the narrow electrode lines, which start on `y = 0`.

use serde::Serialize;

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Orientation, Point, Polygon, Rect};
use crate::layout::{Cell, Instance, PicLib, Ptr};
use crate::tech::TechConfig;

pub const RF_PAD: &str = "RF_PAD";
pub const PADS_PER_ROW: usize = 5;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
pub enum Net {
    Gnd,
    Sig,
}

impl Net {
    /// Net of pad `i` in a GSGSG row, counted from the left.
    pub fn gsgsg(i: usize) -> Self {
        if i % 2 == 0 {
            Net::Gnd
        } else {
            Net::Sig
        }
    }
}

/// The top edge of one pad taper, where an electrode line attaches.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TaperTop {
    pub net: Net,
    pub x0: f64,
    pub x1: f64,
}

impl TaperTop {
    #[inline]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn center(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }
}

/// A pad row cell and the tops of its tapers, left to right.
#[derive(Debug, Clone)]
pub struct PadRow {
    pub cell: Ptr<Cell>,
    pub tops: [TaperTop; PADS_PER_ROW],
}

/// Adds a pad with its probe window. The window is inset by
/// `rf_pad.window_inset` and must leave more than `rf_pad.min_window_space`
/// to the next pad at `pitch`.
pub fn add_pad(cell: &mut Cell, tc: &TechConfig, pad: Rect, pitch: f64) -> LayoutResult<()> {
    let window = pad.expand(-tc.rf_pad.window_inset);
    if pitch - window.width() <= tc.rf_pad.min_window_space {
        return Err(LayoutError::Rule {
            cell: cell.name.to_string(),
            rule: format!(
                "probe window {} um wide leaves less than {} um to the next pad at pitch {pitch}",
                window.width(),
                tc.rf_pad.min_window_space
            ),
        });
    }
    cell.add_rect(tc.layers.met.spec, pad);
    cell.add_rect(tc.layers.pw.spec, window);
    Ok(())
}

/// Center x of pad `i` in a row of [`PADS_PER_ROW`].
#[inline]
pub fn pad_x(tc: &TechConfig, i: usize) -> f64 {
    (i as f64 - 2.0) * tc.rf_pad.pitch
}

/// Adds the five pads of a GSGSG row without tapers.
pub fn add_pad_row(cell: &mut Cell, tc: &TechConfig) -> LayoutResult<()> {
    let rf = &tc.rf_pad;
    let size = rf.pad_size();
    for i in 0..PADS_PER_ROW {
        let x = pad_x(tc, i);
        let pad = Rect::new(
            Point::new(x - size / 2.0, -rf.taper_length - size),
            Point::new(x + size / 2.0, -rf.taper_length),
        );
        add_pad(cell, tc, pad, rf.pitch)?;
    }
    Ok(())
}

fn taper_tops(tc: &TechConfig) -> [TaperTop; PADS_PER_ROW] {
    let rf = &tc.rf_pad;
    let half = rf.pad_size() / 2.0;
    let sig_inner = half + rf.gap_width;
    let sig_outer = sig_inner + rf.sig_width;
    let gnd_inner = sig_outer + rf.gap_width;
    let gnd_outer = gnd_inner + rf.gnd_width;
    [
        TaperTop { net: Net::Gnd, x0: -gnd_outer, x1: -gnd_inner },
        TaperTop { net: Net::Sig, x0: -sig_outer, x1: -sig_inner },
        TaperTop { net: Net::Gnd, x0: -half, x1: half },
        TaperTop { net: Net::Sig, x0: sig_inner, x1: sig_outer },
        TaperTop { net: Net::Gnd, x0: gnd_inner, x1: gnd_outer },
    ]
}

/// Draws the GSGSG pad row with tapers converging on the electrode lines.
pub fn draw_rf_pad(lib: &mut PicLib) -> LayoutResult<PadRow> {
    let tc = lib.tech();
    let tops = taper_tops(&tc);
    let cell = lib.cell_or_insert_with(RF_PAD, |_| {
        let mut cell = Cell::new(RF_PAD);
        add_pad_row(&mut cell, &tc)?;
        let rf = &tc.rf_pad;
        let half = rf.pad_size() / 2.0;
        for (i, top) in tops.iter().enumerate() {
            let x = pad_x(&tc, i);
            cell.add_polygon(
                tc.layers.met.spec,
                Polygon::new(vec![
                    Point::new(x - half, -rf.taper_length),
                    Point::new(x + half, -rf.taper_length),
                    Point::new(top.x1, 0.0),
                    Point::new(top.x0, 0.0),
                ]),
            );
        }
        Ok(cell)
    })?;
    Ok(PadRow { cell, tops })
}

/// Two pad rows facing each other, joined by electrode lines of
/// `line_length`. The upper row is the lower one mirrored about
/// `y = line_length`.
pub fn draw_pad_structure(lib: &mut PicLib, name: &str, line_length: f64) -> LayoutResult<Ptr<Cell>> {
    let row = draw_rf_pad(lib)?;
    let met = lib.tech.layers.met.spec;
    lib.cell_or_insert_with(name, |_| {
        let mut cell = Cell::new(name);
        cell.place(&row.cell, Point::zero());
        for top in row.tops.iter() {
            cell.add_rect(
                met,
                Rect::new(Point::new(top.x0, 0.0), Point::new(top.x1, line_length)),
            );
        }
        cell.add_inst(
            Instance::new(Ptr::clone(&row.cell), Point::new(0.0, line_length))
                .with_orientation(Orientation::reflected(0.0)),
        );
        Ok(cell)
    })
}
