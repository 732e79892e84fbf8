//! Mask text rendered from a 5x7 pixel font.
//!
//! Each glyph is 5 pixels wide and 7 tall, and characters advance by 6
//! pixels. A pixel is `size / 7` so that capitals are `size` tall. The
//! text origin is the lower left corner of the first character.

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Point, Rect};
use crate::tech::LayerSpec;

use super::Cell;

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;
const ADVANCE: usize = 6;

/// Rows of a glyph from top to bottom. Bit 4 is the leftmost column.
type Glyph = [u8; GLYPH_HEIGHT];

fn glyph(c: char) -> Option<Glyph> {
    let g = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'b' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x1E],
        'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
        'd' => [0x01, 0x01, 0x0D, 0x13, 0x11, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'f' => [0x06, 0x09, 0x08, 0x1C, 0x08, 0x08, 0x08],
        'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'h' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11],
        'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
        'j' => [0x02, 0x00, 0x06, 0x02, 0x02, 0x12, 0x0C],
        'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
        'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'p' => [0x00, 0x00, 0x1E, 0x11, 0x1E, 0x10, 0x10],
        'q' => [0x00, 0x00, 0x0D, 0x13, 0x0F, 0x01, 0x01],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
        'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'w' => [0x00, 0x00, 0x11, 0x11, 0x15, 0x15, 0x0A],
        'x' => [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11],
        'y' => [0x00, 0x00, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'z' => [0x00, 0x00, 0x1F, 0x02, 0x04, 0x08, 0x1F],
        ' ' => [0x00; GLYPH_HEIGHT],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => return None,
    };
    Some(g)
}

/// Width of `text` rendered at `size`, from the left edge of the first
/// glyph to the right edge of the last.
pub fn text_width(text: &str, size: f64) -> f64 {
    let n = text.chars().count();
    if n == 0 {
        return 0.0;
    }
    let px = size / GLYPH_HEIGHT as f64;
    ((n - 1) * ADVANCE + GLYPH_WIDTH) as f64 * px
}

/// Renders `text` as rectangles, one per horizontal run of lit pixels.
pub fn render(text: &str, size: f64, origin: Point) -> LayoutResult<Vec<Rect>> {
    let px = size / GLYPH_HEIGHT as f64;
    let mut rects = Vec::new();
    for (i, c) in text.chars().enumerate() {
        let g = glyph(c).ok_or(LayoutError::Glyph(c))?;
        let x0 = origin.x + (i * ADVANCE) as f64 * px;
        for (row, bits) in g.iter().enumerate() {
            let y0 = origin.y + (GLYPH_HEIGHT - 1 - row) as f64 * px;
            let mut col = 0;
            while col < GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    col += 1;
                    continue;
                }
                let start = col;
                while col < GLYPH_WIDTH && bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    col += 1;
                }
                rects.push(Rect::new(
                    Point::new(x0 + start as f64 * px, y0),
                    Point::new(x0 + col as f64 * px, y0 + px),
                ));
            }
        }
    }
    Ok(rects)
}

/// Draws `text` into `cell` on `layer`.
pub fn draw_text(cell: &mut Cell, layer: LayerSpec, text: &str, size: f64, origin: Point) -> LayoutResult<()> {
    for r in render(text, size, origin)? {
        cell.add_rect(layer, r);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_render_extent() {
        let rects = render("500", 70.0, Point::zero()).unwrap();
        let bbox = Rect::bounding(rects.iter().flat_map(|r| [r.p0, r.p1])).unwrap();
        assert_abs_diff_eq!(bbox.p0.x, 0.0);
        assert_abs_diff_eq!(bbox.p0.y, 0.0);
        assert_abs_diff_eq!(bbox.p1.y, 70.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bbox.p1.x, text_width("500", 70.0), epsilon = 1e-9);
    }

    #[test]
    fn test_runs_are_merged() {
        // The top row of an E is a single five pixel run.
        let rects = render("E", 7.0, Point::zero()).unwrap();
        assert!(rects.iter().any(|r| r.width() == 5.0 && r.p1.y == 7.0));
        assert_eq!(rects.len(), 7);
    }

    #[test]
    fn test_every_label_character_renders() {
        render("0123456789 -._XU iLoRpqgjy", 30.0, Point::zero()).unwrap();
        assert!(matches!(
            render("40Ω", 30.0, Point::zero()),
            Err(LayoutError::Glyph('Ω'))
        ));
        assert!(render("", 30.0, Point::zero()).unwrap().is_empty());
    }
}
