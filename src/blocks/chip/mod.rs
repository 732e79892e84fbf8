//! Assembly of a full test chip.
//!
//! Optical I/O leaves through a column of SSCs on the right chip edge.
//! SSC port `i` sits at `ssc_y0 + i * ssc.pitch`. Ports 0 and 1, the two
//! ports after the last modulator and the top two ports are joined by
//! loopbacks for fiber array alignment.
//! Modulators stack in a column west of the SSCs, each aligned so that
//! its `out0` runs straight into its last SSC port. Everything else
//! reaches the column through [`fanin::route_feeds`].

use std::collections::BTreeMap;

use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Heading, Orientation, Point, Rect};
use crate::layout::{Cell, Instance, PicLib, Ptr, Repetition};
use crate::route::{Pose, Router, Trace};

use super::amzm::{draw_amzm, AmzmParams, AmzmVariant};
use super::cpw::{draw_cpw, CpwKind};
use super::gc::{draw_gc, GcParams};
use super::label::draw_port_label;
use super::loopback::draw_loopback;
use super::passive::{draw_passive, PassiveParams};
use super::ssc::{draw_ssc, Side};
use super::{Block, EdgePort};

pub mod fanin;

use fanin::{route_feeds, Feed, Lanes};

pub const MARKER: &str = "probe_marker";
pub const PASSIVE: &str = "passive";

/// Offset of a port label above its SSC.
const LABEL_RISE: f64 = 10.0;
/// SSC ports taken by each loopback pair.
const LOOPBACK_PORTS: usize = 2;
/// Rows and columns of the grating coupler grid.
const GRID_SIZE: usize = 4;

/// A named rectangle on the chip layer, e.g. the area of another design
/// sharing the reticle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
#[serde(default)]
pub struct ModulatorParams {
    /// x of every device origin.
    #[builder(default = "1600.0")]
    pub x: f64,
    /// Nothing in the column may reach below this.
    #[builder(default = "4600.0")]
    pub floor: f64,
    /// Vertical space between devices.
    #[builder(default = "100.0")]
    pub gap: f64,
    /// Clearance of the input detours around a device.
    #[builder(default = "30.0")]
    pub margin: f64,
    /// Waveguide between a grating-coupled device and its couplers.
    #[builder(default = "20.0")]
    pub gc_feed: f64,
    #[builder(default)]
    pub gc: GcParams,
    #[builder(default)]
    pub devices: Vec<AmzmParams>,
}

impl ModulatorParams {
    #[inline]
    pub fn builder() -> ModulatorParamsBuilder {
        ModulatorParamsBuilder::default()
    }
}

impl Default for ModulatorParams {
    fn default() -> Self {
        Self {
            x: 1600.0,
            floor: 4600.0,
            gap: 100.0,
            margin: 30.0,
            gc_feed: 20.0,
            gc: GcParams::default(),
            devices: Vec::new(),
        }
    }
}

/// A row of grating couplers facing south, routed to the SSC ports
/// above the modulators.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
#[serde(default)]
pub struct GcArrayParams {
    #[builder(default = "4")]
    pub count: usize,
    #[builder(default = "160.0")]
    pub pitch: f64,
    /// Port of the leftmost coupler.
    #[builder(default = "Point::new(400.0, 9200.0)")]
    pub origin: Point,
    /// Drop between the coupler ports and their eastbound legs.
    #[builder(default = "30.0")]
    pub drop: f64,
    /// Lower left coupler of a 4x4 grid with the same pitch and drop. Every
    /// grid coupler is routed to its own SSC port after the row above, so
    /// the grid legs must clear the row's couplers.
    #[builder(default)]
    pub grid_origin: Option<Point>,
    #[builder(default)]
    pub gc: GcParams,
}

impl GcArrayParams {
    #[inline]
    pub fn builder() -> GcArrayParamsBuilder {
        GcArrayParamsBuilder::default()
    }
}

impl Default for GcArrayParams {
    fn default() -> Self {
        Self {
            count: 4,
            pitch: 160.0,
            origin: Point::new(400.0, 9200.0),
            drop: 30.0,
            grid_origin: None,
            gc: GcParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpwPlacement {
    pub kind: CpwKind,
    pub length: f64,
    pub at: Point,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassivePlacement {
    /// Height of the pattern origin on the right chip edge.
    pub y: f64,
    #[serde(default)]
    pub params: PassiveParams,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Debug))]
#[serde(default)]
pub struct ChipParams {
    #[builder(default = "5000.0")]
    pub width: f64,
    #[builder(default = "10000.0")]
    pub height: f64,
    #[builder(default)]
    pub regions: Vec<Region>,
    /// y of SSC port 0.
    #[builder(default = "4700.0")]
    pub ssc_y0: f64,
    #[builder(default = "1.0")]
    pub loop_straight_length: f64,
    /// Distance from the SSC ports back to the easternmost routing lane.
    #[builder(default = "50.0")]
    pub lane_margin: f64,
    #[builder(default)]
    pub modulators: ModulatorParams,
    #[builder(default)]
    pub gc_array: Option<GcArrayParams>,
    #[builder(default)]
    pub cpw: Vec<CpwPlacement>,
    /// Lower left corners of the probe alignment markers.
    #[builder(default)]
    pub markers: Vec<Point>,
    #[builder(default = "200.0")]
    pub marker_size: f64,
    #[builder(default)]
    pub passive: Option<PassivePlacement>,
}

impl ChipParams {
    #[inline]
    pub fn builder() -> ChipParamsBuilder {
        ChipParamsBuilder::default()
    }
}

impl Default for ChipParams {
    fn default() -> Self {
        Self {
            width: 5000.0,
            height: 10000.0,
            regions: Vec::new(),
            ssc_y0: 4700.0,
            loop_straight_length: 1.0,
            lane_margin: 50.0,
            modulators: ModulatorParams::default(),
            gc_array: None,
            cpw: Vec::new(),
            markers: Vec::new(),
            marker_size: 200.0,
            passive: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chip {
    pub cell: Ptr<Cell>,
    /// Every port of the SSC column, bottom to top.
    pub ports: Vec<EdgePort>,
    /// Ports of the passive test pattern, in chip coordinates.
    pub passive_ports: Vec<EdgePort>,
}

/// The SSC port assignment as written next to the GDS.
#[derive(Debug, Clone, Serialize)]
pub struct PortMap<'a> {
    pub chip: &'a str,
    pub ssc: &'a [EdgePort],
    pub passive: &'a [EdgePort],
}

impl Chip {
    pub fn port_map(&self) -> PortMap<'_> {
        PortMap {
            chip: self.cell.name.as_str(),
            ssc: &self.ports,
            passive: &self.passive_ports,
        }
    }
}

/// Bounding boxes of everything placed so far.
struct Floorplan {
    outline: Rect,
    claims: Vec<(String, Rect)>,
}

impl Floorplan {
    fn new(outline: Rect) -> Self {
        Self {
            outline,
            claims: Vec::new(),
        }
    }

    fn claim(&mut self, name: &str, rect: Rect) -> LayoutResult<()> {
        let o = &self.outline;
        if rect.p0.x < o.p0.x || rect.p0.y < o.p0.y || rect.p1.x > o.p1.x || rect.p1.y > o.p1.y {
            return Err(LayoutError::Floorplan(format!(
                "`{name}` spans {} to {} and leaves the chip",
                rect.p0, rect.p1
            )));
        }
        if let Some((other, _)) = self.claims.iter().find(|(_, r)| r.overlaps(&rect)) {
            return Err(LayoutError::Floorplan(format!("`{name}` overlaps `{other}`")));
        }
        self.claims.push((name.to_string(), rect));
        Ok(())
    }
}

struct GcRow {
    traces: Vec<Trace>,
    /// Couplers and their legs.
    extent: Option<Rect>,
}

/// Places `count` couplers facing south at `origin + k * pitch` and starts
/// each route east on a leg `drop` or more below the row. The leftmost
/// coupler takes the lowest leg, so no leg runs under another coupler.
fn place_gc_row(
    cell: &mut Cell,
    gc: &Block,
    router: &Router,
    origin: Point,
    count: usize,
    pitch: f64,
    drop: f64,
    rp: f64,
) -> LayoutResult<GcRow> {
    let mut traces = Vec::with_capacity(count);
    let mut extent: Option<Rect> = None;
    for k in 0..count {
        let at = origin + Point::new(pitch * k as f64, 0.0);
        let placed = gc.place_port_at("wg", Pose::new(at, Heading::South), false)?;
        let leg = at.y - drop - (count - 1 - k) as f64 * rp;
        let mut wg = router.trace(placed.port("wg")?);
        wg.run_to(leg, Heading::East)?;
        let mut covered = Rect::new(at, wg.at()).expand(wg.width() / 2.0);
        if let Some(b) = placed.inst.bbox() {
            covered = covered.union(&b);
        }
        extent = Some(extent.map_or(covered, |e| e.union(&covered)));
        placed.add_to(cell);
        traces.push(wg);
    }
    Ok(GcRow { traces, extent })
}

/// Net and label suffix of each assigned SSC port.
type Assignments = BTreeMap<usize, (String, &'static str)>;

pub fn draw_chip(lib: &mut PicLib, name: &str, params: &ChipParams) -> LayoutResult<Chip> {
    let tc = lib.tech();
    let pitch = tc.ssc.pitch;
    let rp = tc.waveguide.routing_pitch;
    let wg_x = params.width - tc.ssc.reach();
    let ssc_y = |i: usize| params.ssc_y0 + pitch * i as f64;
    let ssc_port = |i: usize| Point::new(wg_x, ssc_y(i));
    let router = Router::new(&tc);

    let mut cell = Cell::new(name);
    let mut plan = Floorplan::new(Rect::new(
        Point::zero(),
        Point::new(params.width + tc.ssc.dicing_length, params.height),
    ));
    let mut assigned = Assignments::new();
    let mut feeds = Vec::new();

    for region in params.regions.iter() {
        cell.add_rect(tc.layers.chip.spec, region.rect);
        cell.add_text(tc.layers.chip.spec, region.name.as_str(), region.rect.center());
    }

    // Modulators, bottom to top.
    let mods = &params.modulators;
    let bend = router.cfg().bend_size();
    let mut floor = mods.floor;
    let mut next = LOOPBACK_PORTS;
    let mut east_edge = f64::NEG_INFINITY;
    for dev in mods.devices.iter() {
        let block = draw_amzm(lib, dev)?;
        let dev_name = block.name().to_string();
        let bbox = block
            .cell
            .bbox()
            .ok_or_else(|| LayoutError::Floorplan(format!("device `{dev_name}` is empty")))?;

        if dev.variant == AmzmVariant::Gc {
            let loc = Point::new(mods.x, floor + mods.gap - bbox.p0.y);
            let placed = block.place(loc, Orientation::IDENTITY);
            let mut extent = bbox.translate(loc);
            let gc = draw_gc(lib, &mods.gc)?;
            for port in ["in", "out"] {
                let mut wg = router.trace(placed.port(port)?);
                wg.straight(mods.gc_feed)?;
                wg.draw(&mut cell);
                let coupler = gc.place_port_at("wg", wg.pose().reversed(), false)?;
                if let Some(b) = coupler.inst.bbox() {
                    extent = extent.union(&b);
                }
                coupler.add_to(&mut cell);
            }
            plan.claim(&dev_name, extent)?;
            floor = extent.p1.y;
            east_edge = east_edge.max(extent.p1.x);
            placed.add_to(&mut cell);
            continue;
        }

        // Lowest run of four free ports that keeps the device, its input
        // detours and its input ports above the floor.
        let out0 = block.port("out0")?;
        let detour = mods.margin + rp + 2.0 * bend;
        let first_at_or_above = |y: f64| ((y - params.ssc_y0) / pitch - 1e-9).ceil().max(0.0) as usize;
        let clear_device = first_at_or_above(floor + mods.gap - (bbox.p0.y - detour) + out0.at.y);
        let clear_inputs = first_at_or_above(floor + mods.gap);
        let base = next.max(clear_device.saturating_sub(3)).max(clear_inputs);

        let loc = Point::new(mods.x, ssc_y(base + 3) - out0.at.y);
        let placed = block.place(loc, Orientation::IDENTITY);
        let device_box = bbox.translate(loc);

        // Inputs detour west and south of the device; `in0` takes the
        // outer track.
        for (j, port) in ["in1", "in0"].into_iter().enumerate() {
            let index = base + 1 - j;
            let target = ssc_port(index);
            let inner = device_box.p0.y - mods.margin - j as f64 * rp;
            let leg = if target.y <= inner {
                target.y
            } else if target.y - inner >= 2.0 * bend {
                inner
            } else {
                target.y - 2.0 * bend
            };
            let mut wg = router.trace(placed.port(port)?);
            wg.run_to(device_box.p0.x - mods.margin - j as f64 * rp, Heading::South)?
                .run_to(leg, Heading::East)?;
            feeds.push(Feed::new(format!("{dev_name}.{port}"), wg, target));
            assigned.insert(index, (format!("{dev_name}.{port}"), "i"));
        }
        for (k, port) in ["out1", "out0"].into_iter().enumerate() {
            let index = base + 2 + k;
            feeds.push(Feed::new(
                format!("{dev_name}.{port}"),
                router.trace(placed.port(port)?),
                ssc_port(index),
            ));
            assigned.insert(index, (format!("{dev_name}.{port}"), "o"));
        }

        log::debug!("placed {dev_name} at {loc} on SSC ports {base} to {}", base + 3);
        plan.claim(&dev_name, device_box)?;
        floor = device_box.p1.y;
        east_edge = east_edge.max(device_box.p1.x);
        next = base + 4;
        placed.add_to(&mut cell);
    }

    // A loopback pair between the modulators and the couplers.
    let middle = next + 1;
    next += LOOPBACK_PORTS;

    if let Some(gca) = params.gc_array.as_ref() {
        let gc = draw_gc(lib, &gca.gc)?;
        let row = place_gc_row(&mut cell, &gc, &router, gca.origin, gca.count, gca.pitch, gca.drop, rp)?;
        for (i, wg) in row.traces.into_iter().enumerate() {
            let net = format!("gc{i}");
            feeds.push(Feed::new(net.as_str(), wg, ssc_port(next + i)));
            assigned.insert(next + i, (net, "g"));
        }
        if let Some(extent) = row.extent {
            plan.claim("gc_array", extent)?;
            east_edge = east_edge.max(extent.p1.x);
        }
        next += gca.count;

        if let Some(grid) = gca.grid_origin {
            let mut extent: Option<Rect> = None;
            for r in 0..GRID_SIZE {
                let origin = grid + Point::new(0.0, gca.pitch * r as f64);
                let row = place_gc_row(&mut cell, &gc, &router, origin, GRID_SIZE, gca.pitch, gca.drop, rp)?;
                if let Some(b) = row.extent {
                    extent = Some(extent.map_or(b, |e| e.union(&b)));
                }
                for (c, wg) in row.traces.into_iter().enumerate() {
                    let net = format!("grid{r}.{c}");
                    let suffix = match c {
                        0 => "G16L",
                        c if c == GRID_SIZE - 1 => "G16R",
                        _ => "G16",
                    };
                    feeds.push(Feed::new(net.as_str(), wg, ssc_port(next)));
                    assigned.insert(next, (net, suffix));
                    next += 1;
                }
            }
            if let Some(extent) = extent {
                plan.claim("gc_grid", extent)?;
                east_edge = east_edge.max(extent.p1.x);
            }
        }
    }

    // SSC column with loopback pairs at either end and in the middle.
    let count = next + LOOPBACK_PORTS;
    let top = count - 1;
    let half = tc.ssc.box_half_height;
    if ssc_y(top) + half > params.height || params.ssc_y0 - half < 0.0 {
        return Err(LayoutError::Floorplan(format!(
            "{count} SSC ports from y = {} do not fit on a {} um tall chip",
            params.ssc_y0, params.height
        )));
    }
    let ssc = draw_ssc(lib, Side::Right)?;
    cell.add_inst(
        Instance::new(ssc.cell.clone(), Point::new(params.width, ssc_y(0)))
            .with_repetition(Repetition::rows(count, pitch)),
    );
    plan.claim(
        "ssc_column",
        Rect::new(
            Point::new(wg_x, ssc_y(0) - half),
            Point::new(params.width + tc.ssc.dicing_length, ssc_y(top) + half),
        ),
    )?;
    let lb = draw_loopback(lib, params.loop_straight_length)?;
    for upper in [1, middle, top] {
        lb.place_port_at("a", Pose::new(ssc_port(upper), Heading::East), false)?
            .add_to(&mut cell);
        assigned.insert(upper - 1, ("loopback".to_string(), "U"));
        assigned.insert(upper, ("loopback".to_string(), "U"));
    }

    let lanes = Lanes {
        right: wg_x - params.lane_margin,
        left_limit: east_edge + mods.margin,
        pitch: rp,
    };
    for wg in route_feeds(feeds, &lanes)? {
        wg.draw(&mut cell);
    }

    let mut ports = Vec::with_capacity(count);
    for i in 0..count {
        let (net, suffix) = assigned
            .get(&i)
            .map(|(net, suffix)| (net.clone(), *suffix))
            .unwrap_or_else(|| ("unused".to_string(), ""));
        let label = format!("{i}{suffix}");
        let label_cell = draw_port_label(lib, i, &label)?;
        cell.place(&label_cell, Point::new(wg_x, ssc_y(i) + LABEL_RISE));
        ports.push(EdgePort {
            index: i,
            label,
            net,
            at: Point::new(params.width, ssc_y(i)),
        });
    }
    let unused = ports.iter().filter(|p| p.net == "unused").map(|p| p.index).join(", ");
    if !unused.is_empty() {
        log::debug!("SSC ports without a route: {unused}");
    }

    for (i, c) in params.cpw.iter().enumerate() {
        let cpw = draw_cpw(lib, c.kind, c.length)?;
        let inst = Instance::new(cpw, c.at).rotated(c.rotation);
        if let Some(b) = inst.bbox() {
            plan.claim(&format!("{}#{i}", inst.cell.name), b)?;
        }
        cell.add_inst(inst);
    }

    if !params.markers.is_empty() {
        let size = params.marker_size;
        let marker_name = format!("{MARKER}_{size}");
        let met = tc.layers.met.spec;
        let marker = lib.cell_or_insert_with(&marker_name, |_| {
            let mut mc = Cell::new(marker_name.as_str());
            mc.add_rect(met, Rect::new(Point::zero(), Point::new(size, size)));
            Ok(mc)
        })?;
        for (i, &at) in params.markers.iter().enumerate() {
            plan.claim(&format!("marker#{i}"), Rect::new(at, at + Point::new(size, size)))?;
            cell.place(&marker, at);
        }
    }

    let mut passive_ports = Vec::new();
    if let Some(p) = params.passive.as_ref() {
        let pattern = draw_passive(lib, PASSIVE, &p.params)?;
        let origin = Point::new(params.width, p.y);
        let inst = Instance::new(pattern.cell, origin);
        if let Some(b) = inst.bbox() {
            plan.claim(PASSIVE, b)?;
        }
        cell.add_inst(inst);
        passive_ports = pattern
            .ports
            .into_iter()
            .map(|port| EdgePort {
                at: port.at + origin,
                ..port
            })
            .collect();
    }

    let cell = lib.add_cell(cell)?;
    log::info!(
        "assembled {} with {} devices on {count} SSC ports",
        cell.name,
        mods.devices.len()
    );
    Ok(Chip {
        cell,
        ports,
        passive_ports,
    })
}
