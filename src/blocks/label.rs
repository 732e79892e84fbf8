//! Text labels and port number codes.

use crate::error::LayoutResult;
use crate::geometry::Point;
use crate::layout::text::draw_text;
use crate::layout::{Cell, PicLib, Ptr};
use crate::tech::LayerSpec;

/// Minimum number of bits in a port number code.
pub const PORT_CODE_BITS: usize = 6;

/// The port number as a binary code, most significant bit first, with
/// `X` for a one and `-` for a zero.
///
/// Codes are at least six bits wide and widen for numbers of 64 and
/// above, so every port keeps a distinct code.
pub fn port_number(n: usize) -> String {
    let bits = (usize::BITS - n.leading_zeros()) as usize;
    (0..bits.max(PORT_CODE_BITS))
        .rev()
        .map(|bit| if n >> bit & 1 == 1 { 'X' } else { '-' })
        .collect()
}

/// Draws `text` at the origin of a new cell named `name`.
pub fn draw_label(
    lib: &mut PicLib,
    name: &str,
    text: &str,
    size: f64,
    layer: LayerSpec,
) -> LayoutResult<Ptr<Cell>> {
    lib.cell_or_insert_with(name, |_| {
        let mut cell = Cell::new(name);
        draw_text(&mut cell, layer, text, size, Point::zero())?;
        Ok(cell)
    })
}

/// Draws the label of SSC port `index`: `text` with the port code above it.
pub fn draw_port_label(lib: &mut PicLib, index: usize, text: &str) -> LayoutResult<Ptr<Cell>> {
    let tc = lib.tech();
    let size = tc.label.port_size;
    let name = format!("port_label_{text}");
    lib.cell_or_insert_with(&name, |_| {
        let mut cell = Cell::new(name.as_str());
        let layer = tc.layers.met.spec;
        draw_text(&mut cell, layer, text, size, Point::zero())?;
        draw_text(&mut cell, layer, &port_number(index), size, Point::new(0.0, size))?;
        Ok(cell)
    })
}
