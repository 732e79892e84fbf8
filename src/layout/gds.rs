//! Conversion of [`Library`] data to and from GDSII.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use arcstr::ArcStr;
use log::{debug, warn};

use super::{Cell, Element, Instance, Library, TextElement};
use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{normalize_angle, Orientation, Point};

/// Database units per micrometer.
pub const DBU_PER_UM: f64 = 1000.0;

/// Converts micrometers to database units.
pub fn to_dbu(v: f64) -> LayoutResult<i32> {
    let scaled = (v * DBU_PER_UM).round();
    if scaled.is_finite() && scaled >= i32::MIN as f64 && scaled <= i32::MAX as f64 {
        Ok(scaled as i32)
    } else {
        Err(LayoutError::Overflow(v))
    }
}

#[inline]
pub fn from_dbu(v: i32) -> f64 {
    v as f64 / DBU_PER_UM
}

pub fn export_point(p: Point) -> LayoutResult<gds21::GdsPoint> {
    Ok(gds21::GdsPoint::new(to_dbu(p.x)?, to_dbu(p.y)?))
}

#[inline]
pub fn import_point(p: &gds21::GdsPoint) -> Point {
    Point::new(from_dbu(p.x), from_dbu(p.y))
}

pub fn export_orientation(o: &Orientation) -> Option<gds21::GdsStrans> {
    if o.is_identity() {
        return None;
    }
    let angle = normalize_angle(o.angle);
    Some(gds21::GdsStrans {
        reflected: o.reflect,
        angle: if angle != 0.0 { Some(angle) } else { None },
        ..Default::default()
    })
}

pub fn import_orientation(strans: &Option<gds21::GdsStrans>) -> Orientation {
    match strans {
        Some(s) => Orientation {
            reflect: s.reflected,
            angle: s.angle.unwrap_or(0.0),
        },
        None => Orientation::IDENTITY,
    }
}

/// Loads a GDS library from disk.
pub fn load_gds(path: impl AsRef<Path>) -> LayoutResult<gds21::GdsLibrary> {
    let path = path.as_ref();
    debug!("loading GDS library from {:?}", path);
    Ok(gds21::GdsLibrary::load(path)?)
}

/// Converts `lib` to a GDS library with nanometer database units.
///
/// Foundry placeholder cells are replaced by the structs of the same name
/// in `pdk`, along with everything those structs instantiate.
pub fn to_gds(lib: &Library, pdk: Option<&gds21::GdsLibrary>) -> LayoutResult<gds21::GdsLibrary> {
    let mut gdslib = gds21::GdsLibrary::new(lib.name.clone());
    gdslib.units = gds21::GdsUnits::new(1.0 / DBU_PER_UM, 1e-9);

    let mut written: HashSet<ArcStr> = HashSet::new();
    for cell in lib.cells.iter() {
        if cell.foundry.is_some() {
            if let Some(pdk) = pdk {
                if pdk.structs.iter().any(|s| s.name == cell.name) {
                    for strukt in dependency_order(pdk, &cell.name) {
                        if written.insert(strukt.name.clone()) {
                            gdslib.structs.push(strukt.clone());
                        } else if strukt.name != cell.name {
                            warn!("PDK struct `{}` is already defined; keeping the first", strukt.name);
                        }
                    }
                    continue;
                }
                warn!("foundry cell `{}` not found in PDK library; writing outline", cell.name);
            }
        }
        if !written.insert(cell.name.clone()) {
            return Err(LayoutError::DuplicateCell(cell.name.to_string()));
        }
        gdslib.structs.push(export_cell(cell)?);
    }
    Ok(gdslib)
}

fn export_cell(cell: &Cell) -> LayoutResult<gds21::GdsStruct> {
    let mut strukt = gds21::GdsStruct::new(cell.name.clone());
    for inst in cell.insts.iter() {
        strukt.elems.push(export_instance(inst)?);
    }
    for elem in cell.elems.iter() {
        if let Some(e) = export_element(elem)? {
            strukt.elems.push(e);
        }
    }
    for text in cell.annotations.iter() {
        strukt.elems.push(export_annotation(text)?);
    }
    Ok(strukt)
}

fn export_instance(inst: &Instance) -> LayoutResult<gds21::GdsElement> {
    let strans = export_orientation(&inst.orientation);
    let elem = match inst.repetition {
        Some(ref rep) if rep.cols * rep.rows > 1 => {
            let cols = i16::try_from(rep.cols).map_err(|_| LayoutError::Overflow(rep.cols as f64))?;
            let rows = i16::try_from(rep.rows).map_err(|_| LayoutError::Overflow(rep.rows as f64))?;
            let o = &inst.orientation;
            let col_corner = inst.loc + o.apply(rep.col_step * rep.cols as f64);
            let row_corner = inst.loc + o.apply(rep.row_step * rep.rows as f64);
            gds21::GdsArrayRef {
                name: inst.cell.name.clone(),
                xy: [
                    export_point(inst.loc)?,
                    export_point(col_corner)?,
                    export_point(row_corner)?,
                ],
                cols,
                rows,
                strans,
                ..Default::default()
            }
            .into()
        }
        _ => gds21::GdsStructRef {
            name: inst.cell.name.clone(),
            xy: export_point(inst.loc)?,
            strans,
            ..Default::default()
        }
        .into(),
    };
    Ok(elem)
}

/// GDS boundaries repeat their first point to close the ring.
fn export_element(elem: &Element) -> LayoutResult<Option<gds21::GdsElement>> {
    let pts = &elem.inner.points;
    if pts.len() < 3 {
        return Ok(None);
    }
    let mut xy = Vec::with_capacity(pts.len() + 1);
    for p in pts.iter() {
        let gp = export_point(*p)?;
        // Points that snap together on the grid would make a degenerate edge.
        if xy.last() != Some(&gp) {
            xy.push(gp);
        }
    }
    while xy.len() > 1 && xy.first() == xy.last() {
        xy.pop();
    }
    if xy.len() < 3 {
        return Ok(None);
    }
    xy.push(xy[0].clone());
    Ok(Some(
        gds21::GdsBoundary {
            layer: elem.layer.layer,
            datatype: elem.layer.datatype,
            xy,
            ..Default::default()
        }
        .into(),
    ))
}

fn export_annotation(text: &TextElement) -> LayoutResult<gds21::GdsElement> {
    Ok(gds21::GdsTextElem {
        string: text.string.clone(),
        layer: text.layer.layer,
        texttype: text.layer.datatype,
        xy: export_point(text.loc)?,
        ..Default::default()
    }
    .into())
}

/// The struct named `name` preceded by everything it instantiates.
pub fn dependency_order<'a>(gdslib: &'a gds21::GdsLibrary, name: &str) -> Vec<&'a gds21::GdsStruct> {
    let strukts: HashMap<&str, &gds21::GdsStruct> = gdslib
        .structs
        .iter()
        .map(|s| (s.name.as_str(), s))
        .collect();
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    visit(&strukts, name, &mut seen, &mut order);
    order
}

fn visit<'a>(
    strukts: &HashMap<&str, &'a gds21::GdsStruct>,
    name: &str,
    seen: &mut HashSet<ArcStr>,
    order: &mut Vec<&'a gds21::GdsStruct>,
) {
    let Some(strukt) = strukts.get(name).copied() else {
        warn!("reference to undefined struct `{}`", name);
        return;
    };
    if !seen.insert(strukt.name.clone()) {
        return;
    }
    for elem in strukt.elems.iter() {
        match elem {
            gds21::GdsElement::GdsStructRef(x) => visit(strukts, &x.name, seen, order),
            gds21::GdsElement::GdsArrayRef(x) => visit(strukts, &x.name, seen, order),
            _ => (),
        }
    }
    order.push(strukt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::layout::{Cell, Instance, Ptr, Repetition};
    use crate::tech::LayerSpec;

    fn sample_lib() -> Library {
        let mut pad = Cell::new("pad");
        pad.add_rect(
            LayerSpec::new(36, 0),
            Rect::new(Point::new(-55.0, 0.0), Point::new(55.0, 110.0)),
        );
        let pad = Ptr::new(pad);
        let mut top = Cell::new("top");
        top.add_inst(
            Instance::new(Ptr::clone(&pad), Point::new(-125.0, 0.0))
                .rotated(90.0)
                .with_repetition(Repetition::cols(3, 125.0)),
        );
        top.add_text(LayerSpec::new(36, 0), "SIG", Point::new(0.0, 55.0));
        Library::from_top("sample", &Ptr::new(top)).unwrap()
    }

    #[test]
    fn test_to_dbu() {
        assert_eq!(to_dbu(0.44).unwrap(), 440);
        assert_eq!(to_dbu(-41.016).unwrap(), -41016);
        assert_eq!(to_dbu(0.0004).unwrap(), 0);
        assert!(matches!(to_dbu(3e6), Err(LayoutError::Overflow(_))));
    }

    #[test]
    fn test_export_structure() {
        let gds = to_gds(&sample_lib(), None).unwrap();
        assert_eq!(gds.structs.len(), 2);
        assert_eq!(gds.structs[0].name, "pad");
        let top = &gds.structs[1];
        assert_eq!(top.elems.len(), 2);
        match &top.elems[0] {
            gds21::GdsElement::GdsArrayRef(a) => {
                assert_eq!((a.cols, a.rows), (3, 1));
                assert_eq!(a.xy[0], gds21::GdsPoint::new(-125_000, 0));
                // The column vector turns with the instance.
                assert_eq!(a.xy[1], gds21::GdsPoint::new(-125_000, 375_000));
                assert_eq!(a.strans.as_ref().and_then(|s| s.angle), Some(90.0));
            }
            other => panic!("expected an array reference, got {other:?}"),
        }
        match &gds.structs[0].elems[0] {
            gds21::GdsElement::GdsBoundary(b) => {
                assert_eq!(b.xy.len(), 5);
                assert_eq!(b.xy[0], b.xy[4]);
                assert_eq!(b.layer, 36);
            }
            other => panic!("expected a boundary, got {other:?}"),
        }
    }

    #[test]
    fn test_gds_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.gds");
        to_gds(&sample_lib(), None).unwrap().save(&path).unwrap();
        let loaded = load_gds(&path).unwrap();
        let names: Vec<&str> = loaded.structs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["pad", "top"]);
        assert_eq!(dependency_order(&loaded, "top").len(), 2);
        assert_eq!(dependency_order(&loaded, "pad").len(), 1);
    }

    #[test]
    fn test_foundry_cells_replaced_from_pdk() {
        let mut pdk = gds21::GdsLibrary::new("pdk");
        let mut leaf = gds21::GdsStruct::new("AIST_GC_grating");
        leaf.elems.push(
            gds21::GdsBoundary {
                layer: 40,
                datatype: 0,
                xy: gds21::GdsPoint::vec(&[(0, 0), (10, 0), (10, 10), (0, 0)]),
                ..Default::default()
            }
            .into(),
        );
        let mut gc = gds21::GdsStruct::new("AIST_GC");
        gc.elems.push(
            gds21::GdsStructRef {
                name: "AIST_GC_grating".into(),
                xy: gds21::GdsPoint::new(0, 0),
                ..Default::default()
            }
            .into(),
        );
        pdk.structs.push(gc);
        pdk.structs.push(leaf);

        let tech = crate::tech::AIST.clone();
        let fc = tech.foundry_cell(crate::tech::FOUNDRY_GC).unwrap();
        let placeholder = Ptr::new(Cell::foundry(fc, tech.layers.chip.spec));
        let mut top = Cell::new("top");
        top.place(&placeholder, Point::zero());
        let lib = Library::from_top("with_pdk", &Ptr::new(top)).unwrap();

        let gds = to_gds(&lib, Some(&pdk)).unwrap();
        let names: Vec<&str> = gds.structs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["AIST_GC_grating", "AIST_GC", "top"]);

        let gds = to_gds(&lib, None).unwrap();
        assert_eq!(gds.structs.len(), 2);
    }
}
