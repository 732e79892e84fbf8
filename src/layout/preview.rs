use std::collections::BTreeMap;
use std::path::Path;

use plotters::element::Polygon as PlotPolygon;
use plotters::prelude::*;

use super::Cell;
use crate::tech::LayerSpec;
use crate::{anyhow, Result};

pub struct PreviewParams<'a> {
    pub cell: &'a Cell,
    pub output_path: &'a Path,
    /// Width of the image in pixels. The height follows the cell's aspect ratio.
    pub width: u32,
    /// Layers left out of the drawing, e.g. the chip canvas.
    pub hidden: &'a [LayerSpec],
}

/// Renders the flattened cell as an SVG with one color per layer.
pub fn render_svg(params: PreviewParams) -> Result<()> {
    let PreviewParams {
        cell,
        output_path,
        width,
        hidden,
    } = params;

    let bbox = cell
        .bbox()
        .ok_or_else(|| anyhow!("cell `{}` is empty", cell.name))?
        .expand(10.0);
    let height = ((width as f64) * bbox.height() / bbox.width()).ceil().clamp(1.0, 20_000.0) as u32;

    let mut layers: BTreeMap<LayerSpec, Vec<Vec<(f64, f64)>>> = BTreeMap::new();
    for elem in cell.flatten() {
        if hidden.contains(&elem.layer) {
            continue;
        }
        layers
            .entry(elem.layer)
            .or_default()
            .push(elem.inner.points.iter().map(|p| (p.x, p.y)).collect());
    }

    let root = SVGBackend::new(output_path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(5)
        .caption(cell.name.as_str(), ("sans-serif", 20.0).into_font())
        .build_cartesian_2d(bbox.p0.x..bbox.p1.x, bbox.p0.y..bbox.p1.y)
        .map_err(|e| anyhow!("{e}"))?;

    for (i, (layer, polys)) in layers.into_iter().enumerate() {
        let color = Palette99::pick(i).mix(0.6);
        chart
            .draw_series(
                polys
                    .into_iter()
                    .map(|pts| PlotPolygon::new(pts, color.filled())),
            )
            .map_err(|e| anyhow!("{e}"))?
            .label(format!("{}/{}", layer.layer, layer.datatype))
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    root.present().map_err(|e| anyhow!("{e}"))?;
    log::info!("preview saved to {:?}", output_path);

    Ok(())
}
