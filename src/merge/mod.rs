//! Merging of GDS libraries from several parties into one top cell.
//!
//! Libraries are merged at the GDS level so that foundry and third-party
//! structs pass through untouched. Struct names are global: when two
//! libraries define a struct of the same name, the first one wins.

use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use log::{debug, info, warn};

use crate::config::merge::{Exclusion, MergeConfig, MergeSource};
use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Point, Rect, Transform};
use crate::layout::gds::{
    export_orientation, export_point, from_dbu, import_orientation, import_point, load_gds,
    DBU_PER_UM,
};

/// Relative tolerance on the database unit of merged libraries.
const UNIT_TOLERANCE: f64 = 1e-6;

/// Merges the libraries of `config` into a new library whose top struct
/// places every source's top cell.
pub fn merge_libraries(config: &MergeConfig) -> LayoutResult<gds21::GdsLibrary> {
    let mut merged = gds21::GdsLibrary::new(config.name.as_str());
    merged.units = gds21::GdsUnits::new(1.0 / DBU_PER_UM, 1e-9);
    let mut top = gds21::GdsStruct::new(config.name.as_str());
    let mut names: HashSet<ArcStr> = HashSet::new();

    for source in config.sources.iter() {
        let lib = prepare_source(source)?;
        let top_name = source.top_name();
        let mut dropped = 0;
        for strukt in lib.structs {
            if strukt.name.as_str() == config.name {
                return Err(merge_error(
                    source,
                    format!("struct `{}` has the name of the merged top cell", config.name),
                ));
            }
            if names.contains(&strukt.name) {
                if strukt.name.as_str() == top_name {
                    return Err(merge_error(
                        source,
                        format!("top cell `{top_name}` is already defined by an earlier library"),
                    ));
                }
                warn!(
                    "struct `{}` from {:?} is already defined; keeping the first one",
                    strukt.name, source.path
                );
                dropped += 1;
                continue;
            }
            names.insert(strukt.name.clone());
            merged.structs.push(strukt);
        }
        info!(
            "merged {:?} as `{top_name}` at {} ({dropped} duplicate structs dropped)",
            source.path, source.origin
        );

        top.elems.push(gds21::GdsElement::GdsStructRef(gds21::GdsStructRef {
            name: top_name.into(),
            xy: export_point(source.origin)?,
            strans: export_orientation(&source.orientation),
            ..Default::default()
        }));
    }

    merged.structs.push(top);
    Ok(merged)
}

/// Loads a source library and applies its renaming and exclusions.
fn prepare_source(source: &MergeSource) -> LayoutResult<gds21::GdsLibrary> {
    let mut lib = load_gds(&source.path)?;
    let db_unit = lib.units.db_unit();
    if ((db_unit - 1e-9) / 1e-9).abs() > UNIT_TOLERANCE {
        return Err(merge_error(
            source,
            format!("database unit is {db_unit:e} m; only 1 nm is supported"),
        ));
    }

    if !lib.structs.iter().any(|s| s.name.as_str() == source.cell) {
        return Err(merge_error(source, format!("no struct named `{}`", source.cell)));
    }
    if let Some(rename) = &source.rename {
        rename_struct(&mut lib, &source.cell, rename).map_err(|reason| merge_error(source, reason))?;
    }
    for exclusion in source.exclude.iter() {
        let removed = apply_exclusion(&mut lib, exclusion).map_err(|reason| merge_error(source, reason))?;
        info!(
            "removed {removed} elements of `{}` overlapping {:?}",
            exclusion.cell, exclusion.rect
        );
    }
    Ok(lib)
}

fn merge_error(source: &MergeSource, reason: String) -> LayoutError {
    LayoutError::Merge {
        path: source.path.clone(),
        reason,
    }
}

/// Renames struct `from` to `to` along with every reference to it.
fn rename_struct(lib: &mut gds21::GdsLibrary, from: &str, to: &str) -> Result<(), String> {
    if from == to {
        return Ok(());
    }
    if lib.structs.iter().any(|s| s.name.as_str() == to) {
        return Err(format!("cannot rename `{from}`: a struct named `{to}` exists"));
    }
    let to = ArcStr::from(to);
    for strukt in lib.structs.iter_mut() {
        if strukt.name.as_str() == from {
            strukt.name = to.clone();
        }
        for elem in strukt.elems.iter_mut() {
            match elem {
                gds21::GdsElement::GdsStructRef(r) if r.name.as_str() == from => r.name = to.clone(),
                gds21::GdsElement::GdsArrayRef(a) if a.name.as_str() == from => a.name = to.clone(),
                _ => (),
            }
        }
    }
    debug!("renamed struct `{from}` to `{to}`");
    Ok(())
}

/// Removes the shapes and references of the excluded cell whose bounding
/// box overlaps the exclusion box. Returns the number of removed elements.
fn apply_exclusion(lib: &mut gds21::GdsLibrary, exclusion: &Exclusion) -> Result<usize, String> {
    let keep: Vec<bool> = {
        let strukt = lib
            .structs
            .iter()
            .find(|s| s.name.as_str() == exclusion.cell)
            .ok_or_else(|| format!("no struct named `{}` to exclude from", exclusion.cell))?;
        let mut bboxes = BoundingBoxes::new(lib);
        strukt
            .elems
            .iter()
            .map(|elem| match bboxes.elem(elem) {
                Some(bbox) => !bbox.overlaps(&exclusion.rect),
                None => true,
            })
            .collect()
    };

    let strukt = lib
        .structs
        .iter_mut()
        .find(|s| s.name.as_str() == exclusion.cell)
        .ok_or_else(|| format!("no struct named `{}` to exclude from", exclusion.cell))?;
    let before = strukt.elems.len();
    let mut keep = keep.into_iter();
    strukt.elems.retain(|_| keep.next().unwrap_or(true));
    Ok(before - strukt.elems.len())
}

/// Memoized bounding boxes of the structs of a library, in micrometers.
struct BoundingBoxes<'a> {
    structs: HashMap<&'a str, &'a gds21::GdsStruct>,
    cache: HashMap<&'a str, Option<Rect>>,
}

impl<'a> BoundingBoxes<'a> {
    fn new(lib: &'a gds21::GdsLibrary) -> Self {
        Self {
            structs: lib.structs.iter().map(|s| (s.name.as_str(), s)).collect(),
            cache: HashMap::new(),
        }
    }

    fn strukt(&mut self, name: &str) -> Option<Rect> {
        if let Some(bbox) = self.cache.get(name) {
            return *bbox;
        }
        let strukt = match self.structs.get(name) {
            Some(s) => *s,
            None => {
                warn!("reference to undefined struct `{name}`");
                return None;
            }
        };
        // Guards against reference cycles.
        self.cache.insert(strukt.name.as_str(), None);
        let bbox = strukt
            .elems
            .iter()
            .filter_map(|elem| self.elem(elem))
            .reduce(|a, b| a.union(&b));
        self.cache.insert(strukt.name.as_str(), bbox);
        bbox
    }

    fn elem(&mut self, elem: &gds21::GdsElement) -> Option<Rect> {
        use gds21::GdsElement::*;
        match elem {
            GdsBoundary(b) => Rect::bounding(b.xy.iter().map(import_point)),
            GdsBox(b) => Rect::bounding(b.xy.iter().map(import_point)),
            GdsPath(p) => {
                let half = p.width.map_or(0.0, |w| from_dbu(w.abs()) / 2.0);
                Rect::bounding(p.xy.iter().map(import_point)).map(|r| r.expand(half))
            }
            GdsStructRef(r) => {
                let child = self.strukt(&r.name)?;
                let t = Transform::new(import_point(&r.xy), import_orientation(&r.strans));
                Some(t.apply_rect(&child))
            }
            GdsArrayRef(a) => {
                let child = self.strukt(&a.name)?;
                let origin = import_point(&a.xy[0]);
                let cols = a.cols.max(1) as f64;
                let rows = a.rows.max(1) as f64;
                let col_span = import_point(&a.xy[1]) - origin;
                let row_span = import_point(&a.xy[2]) - origin;
                let last_col = col_span * ((cols - 1.0) / cols);
                let last_row = row_span * ((rows - 1.0) / rows);
                let orientation = import_orientation(&a.strans);
                [Point::zero(), last_col, last_row, last_col + last_row]
                    .into_iter()
                    .map(|offset| Transform::new(origin + offset, orientation).apply_rect(&child))
                    .reduce(|a, b| a.union(&b))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::geometry::Orientation;
    use crate::layout::{Cell, Instance, PicLib, Repetition};
    use crate::tech::AIST;

    fn source(path: &Path, cell: &str) -> MergeSource {
        MergeSource {
            path: path.to_path_buf(),
            cell: cell.to_string(),
            rename: None,
            origin: Point::zero(),
            orientation: Orientation::IDENTITY,
            exclude: Vec::new(),
        }
    }

    /// A base library: `MPW_cell` places `shared` and a column of SSC
    /// stand-ins 100 um apart.
    fn write_base(path: &Path) -> LayoutResult<()> {
        let layer = AIST.layers.siwg.spec;
        let mut lib = PicLib::new(AIST.clone());
        let mut shared = Cell::new("shared");
        shared.add_rect(layer, Rect::new(Point::zero(), Point::new(10.0, 10.0)));
        let shared = lib.add_cell(shared)?;

        let mut unit = Cell::new("ssc_unit");
        unit.add_rect(layer, Rect::new(Point::new(-100.0, -1.0), Point::zero()));
        let unit = lib.add_cell(unit)?;
        let mut column = Cell::new("ssc_array");
        for i in 0..3 {
            column.place(&unit, Point::new(0.0, 100.0 * i as f64));
        }
        column.add_rect(layer, Rect::new(Point::new(-20.0, 195.0), Point::new(-10.0, 205.0)));
        let column = lib.add_cell(column)?;

        let mut top = Cell::new("MPW_cell");
        top.place(&shared, Point::zero());
        top.place(&column, Point::new(5000.0, 0.0));
        let top = lib.add_cell(top)?;
        lib.save_gds(&top, path)
    }

    /// A party library whose `shared` differs from the base one.
    fn write_party(path: &Path) -> LayoutResult<()> {
        let layer = AIST.layers.siwg.spec;
        let mut lib = PicLib::new(AIST.clone());
        let mut shared = Cell::new("shared");
        shared.add_rect(layer, Rect::new(Point::zero(), Point::new(20.0, 20.0)));
        shared.add_rect(layer, Rect::new(Point::new(30.0, 0.0), Point::new(40.0, 20.0)));
        let shared = lib.add_cell(shared)?;
        let mut top = Cell::new("party");
        top.add_inst(
            Instance::new(shared, Point::zero()).with_repetition(Repetition::cols(2, 100.0)),
        );
        let top = lib.add_cell(top)?;
        lib.save_gds(&top, path)
    }

    #[test]
    fn test_merge_libraries() -> LayoutResult<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("base.gds");
        let party = dir.path().join("party.gds");
        write_base(&base)?;
        write_party(&party)?;

        let mut base_source = source(&base, "MPW_cell");
        base_source.rename = Some("BASE".to_string());
        base_source.exclude.push(Exclusion {
            cell: "ssc_array".to_string(),
            rect: Rect::new(Point::new(-50.0, 90.0), Point::new(-5.0, 210.0)),
        });
        let mut party_source = source(&party, "party");
        party_source.origin = Point::new(0.0, 6000.0);
        party_source.orientation = Orientation::rotated(90.0);
        let config = MergeConfig {
            name: "TOP".to_string(),
            sources: vec![base_source, party_source],
        };

        let merged = merge_libraries(&config)?;
        let names: Vec<_> = merged.structs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"BASE"));
        assert!(!names.contains(&"MPW_cell"));
        assert_eq!(names.iter().filter(|n| **n == "shared").count(), 1);
        assert_eq!(names.last(), Some(&"TOP"));

        // The first `shared` wins.
        let shared = merged.structs.iter().find(|s| s.name.as_str() == "shared").unwrap();
        assert_eq!(shared.elems.len(), 1);

        // The references at y = 100 and y = 200 and the marker rectangle go.
        let column = merged.structs.iter().find(|s| s.name.as_str() == "ssc_array").unwrap();
        assert_eq!(column.elems.len(), 1);

        let top = merged.structs.last().unwrap();
        assert_eq!(top.elems.len(), 2);
        match &top.elems[1] {
            gds21::GdsElement::GdsStructRef(r) => {
                assert_eq!(r.name.as_str(), "party");
                assert_eq!(r.xy, gds21::GdsPoint::new(0, 6_000_000));
                assert_eq!(r.strans.as_ref().and_then(|s| s.angle), Some(90.0));
            }
            other => panic!("expected a struct reference, got {other:?}"),
        }

        let out = dir.path().join("merged.gds");
        merged.save(&out)?;
        let reloaded = load_gds(&out)?;
        assert_eq!(reloaded.structs.len(), merged.structs.len());
        Ok(())
    }

    #[test]
    fn test_array_bbox() -> LayoutResult<()> {
        let dir = tempfile::tempdir()?;
        let party = dir.path().join("party.gds");
        write_party(&party)?;
        let lib = load_gds(&party)?;
        let mut bboxes = BoundingBoxes::new(&lib);
        let bbox = bboxes.strukt("party").unwrap();
        assert_abs_diff_eq!(bbox.p0.x, 0.0);
        assert_abs_diff_eq!(bbox.p1.x, 140.0);
        assert_abs_diff_eq!(bbox.p1.y, 20.0);
        Ok(())
    }

    #[test]
    fn test_rename_updates_references() -> LayoutResult<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("base.gds");
        write_base(&base)?;
        let mut lib = load_gds(&base)?;
        rename_struct(&mut lib, "ssc_array", "ssc_column").unwrap();
        let top = lib.structs.iter().find(|s| s.name.as_str() == "MPW_cell").unwrap();
        assert!(top.elems.iter().any(|e| matches!(
            e,
            gds21::GdsElement::GdsStructRef(r) if r.name.as_str() == "ssc_column"
        )));
        assert!(rename_struct(&mut lib, "ssc_column", "shared").is_err());
        Ok(())
    }

    #[test]
    fn test_merge_rejects_micron_units() -> LayoutResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("um.gds");
        let mut lib = gds21::GdsLibrary::new("um");
        lib.units = gds21::GdsUnits::new(1.0, 1e-6);
        lib.structs.push(gds21::GdsStruct::new("chip"));
        lib.save(&path)?;

        let config = MergeConfig {
            name: "TOP".to_string(),
            sources: vec![source(&path, "chip")],
        };
        assert!(matches!(merge_libraries(&config), Err(LayoutError::Merge { .. })));
        Ok(())
    }

    #[test]
    fn test_merge_missing_cell() -> LayoutResult<()> {
        let dir = tempfile::tempdir()?;
        let party = dir.path().join("party.gds");
        write_party(&party)?;
        let config = MergeConfig {
            name: "TOP".to_string(),
            sources: vec![source(&party, "nope")],
        };
        assert!(matches!(merge_libraries(&config), Err(LayoutError::Merge { .. })));
        Ok(())
    }
}
