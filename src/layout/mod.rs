//! Hierarchical layout data: cells, shapes, instances and libraries.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arcstr::ArcStr;

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Orientation, Point, Polygon, Rect, Transform};
use crate::tech::{FoundryCell, LayerSpec, TechConfig};

pub mod gds;
pub mod preview;
pub mod text;

pub type Ptr<T> = Arc<T>;

/// A polygon on a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub layer: LayerSpec,
    pub inner: Polygon,
}

impl Element {
    #[inline]
    pub fn new(layer: LayerSpec, inner: impl Into<Polygon>) -> Self {
        Self {
            layer,
            inner: inner.into(),
        }
    }
}

/// A text annotation. Written as a GDS `TEXT` record; it has no mask geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub string: ArcStr,
    pub layer: LayerSpec,
    pub loc: Point,
}

/// Array repetition of an instance, in the referenced cell's frame.
///
/// The lattice turns with the instance orientation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Repetition {
    pub cols: usize,
    pub rows: usize,
    pub col_step: Point,
    pub row_step: Point,
}

impl Repetition {
    pub fn cols(cols: usize, pitch: f64) -> Self {
        Self {
            cols,
            rows: 1,
            col_step: Point::new(pitch, 0.0),
            row_step: Point::zero(),
        }
    }

    pub fn rows(rows: usize, pitch: f64) -> Self {
        Self {
            cols: 1,
            rows,
            col_step: Point::zero(),
            row_step: Point::new(0.0, pitch),
        }
    }

    /// Lattice offsets, row by row.
    pub fn offsets(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.rows).flat_map(move |r| {
            (0..self.cols).map(move |c| self.col_step * c as f64 + self.row_step * r as f64)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub cell: Ptr<Cell>,
    pub loc: Point,
    pub orientation: Orientation,
    pub repetition: Option<Repetition>,
}

impl Instance {
    pub fn new(cell: Ptr<Cell>, loc: Point) -> Self {
        Self {
            cell,
            loc,
            orientation: Orientation::IDENTITY,
            repetition: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn rotated(self, angle: f64) -> Self {
        self.with_orientation(Orientation::rotated(angle))
    }

    pub fn with_repetition(mut self, repetition: Repetition) -> Self {
        self.repetition = Some(repetition);
        self
    }

    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.loc, self.orientation)
    }

    /// One transform per placed copy of the cell.
    pub fn placements(&self) -> Vec<Transform> {
        let base = self.transform();
        match self.repetition {
            None => vec![base],
            Some(ref rep) => rep
                .offsets()
                .map(|off| Transform::new(base.apply(off), self.orientation))
                .collect(),
        }
    }

    pub fn bbox(&self) -> Option<Rect> {
        let inner = self.cell.bbox()?;
        self.placements()
            .iter()
            .map(|t| t.apply_rect(&inner))
            .reduce(|a, b| a.union(&b))
    }
}

/// A foundry-supplied cell that is drawn as an outline unless the PDK
/// GDS is available at export time.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundryRef {
    pub bbox: Rect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub name: ArcStr,
    pub elems: Vec<Element>,
    pub annotations: Vec<TextElement>,
    pub insts: Vec<Instance>,
    pub foundry: Option<FoundryRef>,
}

impl Cell {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A placeholder for a foundry cell: its footprint outline on `layer`.
    pub fn foundry(fc: &FoundryCell, layer: LayerSpec) -> Self {
        let mut cell = Cell::new(fc.name.as_str());
        cell.add_rect(layer, fc.bbox);
        cell.foundry = Some(FoundryRef { bbox: fc.bbox });
        cell
    }

    #[inline]
    pub fn add(&mut self, elem: Element) {
        self.elems.push(elem);
    }

    pub fn add_rect(&mut self, layer: LayerSpec, rect: Rect) {
        self.elems.push(Element::new(layer, rect));
    }

    pub fn add_polygon(&mut self, layer: LayerSpec, poly: Polygon) {
        self.elems.push(Element::new(layer, poly));
    }

    pub fn add_inst(&mut self, inst: Instance) {
        self.insts.push(inst);
    }

    /// Places `cell` at `loc` without rotation.
    pub fn place(&mut self, cell: &Ptr<Cell>, loc: Point) {
        self.insts.push(Instance::new(Ptr::clone(cell), loc));
    }

    pub fn add_text(&mut self, layer: LayerSpec, string: impl Into<ArcStr>, loc: Point) {
        self.annotations.push(TextElement {
            string: string.into(),
            layer,
            loc,
        });
    }

    /// Bounding box of all shapes, including those of instantiated cells.
    pub fn bbox(&self) -> Option<Rect> {
        let own = self.elems.iter().filter_map(|e| e.inner.bbox());
        let insts = self.insts.iter().filter_map(|i| i.bbox());
        own.chain(insts).reduce(|a, b| a.union(&b))
    }

    /// Width and height of the bounding box; zero for an empty cell.
    pub fn size(&self) -> (f64, f64) {
        self.bbox()
            .map(|r| (r.width(), r.height()))
            .unwrap_or((0.0, 0.0))
    }

    /// A copy of this cell named `name` with every top-level shape on
    /// `layer` removed.
    pub fn without_layer(&self, layer: LayerSpec, name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            elems: self
                .elems
                .iter()
                .filter(|e| e.layer != layer)
                .cloned()
                .collect(),
            annotations: self.annotations.clone(),
            insts: self.insts.clone(),
            foundry: self.foundry.clone(),
        }
    }

    /// All shapes of the hierarchy in this cell's frame.
    pub fn flatten(&self) -> Vec<Element> {
        let mut out = Vec::new();
        self.flatten_into(&Transform::identity(), &mut out);
        out
    }

    fn flatten_into(&self, t: &Transform, out: &mut Vec<Element>) {
        for e in self.elems.iter() {
            out.push(Element {
                layer: e.layer,
                inner: e.inner.transform(t),
            });
        }
        for inst in self.insts.iter() {
            for p in inst.placements() {
                inst.cell.flatten_into(&t.compose(&p), out);
            }
        }
    }
}

/// A set of cells, ordered so that every cell comes after the cells it
/// instantiates.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub name: ArcStr,
    pub cells: Vec<Ptr<Cell>>,
}

impl Library {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
        }
    }

    /// Collects `top` and everything it depends on.
    pub fn from_top(name: impl Into<ArcStr>, top: &Ptr<Cell>) -> LayoutResult<Self> {
        let mut lib = Self::new(name);
        let mut seen: HashMap<ArcStr, Ptr<Cell>> = HashMap::new();
        lib.collect(top, &mut seen)?;
        Ok(lib)
    }

    fn collect(&mut self, cell: &Ptr<Cell>, seen: &mut HashMap<ArcStr, Ptr<Cell>>) -> LayoutResult<()> {
        if let Some(existing) = seen.get(&cell.name) {
            if Ptr::ptr_eq(existing, cell) || **existing == **cell {
                return Ok(());
            }
            return Err(LayoutError::DuplicateCell(cell.name.to_string()));
        }
        for inst in cell.insts.iter() {
            self.collect(&inst.cell, seen)?;
        }
        // A cell might have been reached again through its own children.
        if seen.contains_key(&cell.name) {
            return Ok(());
        }
        seen.insert(cell.name.clone(), Ptr::clone(cell));
        self.cells.push(Ptr::clone(cell));
        Ok(())
    }

    pub fn cell(&self, name: &str) -> Option<&Ptr<Cell>> {
        self.cells.iter().find(|c| c.name == name)
    }

    /// The cells that no other cell instantiates.
    pub fn top_cells(&self) -> Vec<&Ptr<Cell>> {
        let used: HashSet<&ArcStr> = self
            .cells
            .iter()
            .flat_map(|c| c.insts.iter().map(|i| &i.cell.name))
            .collect();
        self.cells.iter().filter(|c| !used.contains(&c.name)).collect()
    }
}

/// Generator state shared by the block generators: the technology and a
/// cache of cells drawn so far, keyed by name.
#[derive(Debug, Clone)]
pub struct PicLib {
    pub tech: Arc<TechConfig>,
    pub pdk_gds: Option<PathBuf>,
    cells: HashMap<ArcStr, Ptr<Cell>>,
}

impl PicLib {
    pub fn new(tech: Arc<TechConfig>) -> Self {
        Self {
            tech,
            pdk_gds: None,
            cells: HashMap::new(),
        }
    }

    pub fn with_pdk_gds(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdk_gds = Some(path.into());
        self
    }

    #[inline]
    pub fn tech(&self) -> Arc<TechConfig> {
        Arc::clone(&self.tech)
    }

    /// Registers a finished cell. Fails if a different cell already has its name.
    pub fn add_cell(&mut self, cell: Cell) -> LayoutResult<Ptr<Cell>> {
        if let Some(existing) = self.cells.get(&cell.name) {
            if **existing == cell {
                return Ok(Ptr::clone(existing));
            }
            return Err(LayoutError::DuplicateCell(cell.name.to_string()));
        }
        let cell = Ptr::new(cell);
        self.cells.insert(cell.name.clone(), Ptr::clone(&cell));
        Ok(cell)
    }

    pub fn get(&self, name: &str) -> Option<Ptr<Cell>> {
        self.cells.get(name).cloned()
    }

    /// Returns the cell named `name`, drawing it with `f` on first use.
    pub fn cell_or_insert_with<F>(&mut self, name: &str, f: F) -> LayoutResult<Ptr<Cell>>
    where
        F: FnOnce(&mut PicLib) -> LayoutResult<Cell>,
    {
        if let Some(cell) = self.cells.get(name) {
            return Ok(Ptr::clone(cell));
        }
        let cell = f(self)?;
        self.add_cell(cell)
    }

    /// The placeholder cell of a foundry device.
    pub fn foundry_cell(&mut self, name: &str) -> LayoutResult<Ptr<Cell>> {
        let tech = self.tech();
        let fc = tech.foundry_cell(name)?;
        let layer = tech.layers.chip.spec;
        self.cell_or_insert_with(name, |_| Ok(Cell::foundry(fc, layer)))
    }

    /// Writes `top` and its dependencies to a GDS file.
    pub fn save_gds(&self, top: &Ptr<Cell>, path: impl AsRef<Path>) -> LayoutResult<()> {
        let lib = Library::from_top(top.name.clone(), top)?;
        let pdk = match self.pdk_gds {
            Some(ref p) => Some(gds::load_gds(p)?),
            None => None,
        };
        let gdslib = gds::to_gds(&lib, pdk.as_ref())?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        gdslib.save(path)?;
        Ok(())
    }
}
