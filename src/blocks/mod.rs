//! Photonic building blocks.
//!
//! Every generator draws one cell and reports the poses of its ports in
//! the cell frame. A port heading points out of the block, so a route
//! that ends on a port arrives with the opposite heading.

use arcstr::ArcStr;
use serde::Serialize;

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{Orientation, Point, Transform};
use crate::layout::{Cell, Instance, Ptr};
use crate::route::Pose;

pub mod amzm;
pub mod chip;
pub mod cpw;
pub mod foundry;
pub mod gc;
pub mod label;
pub mod loopback;
pub mod pads;
pub mod passive;
pub mod pin;
pub mod sbend;
pub mod ssc;
pub mod tin;

#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub name: ArcStr,
    pub pose: Pose,
}

impl Port {
    pub fn new(name: impl Into<ArcStr>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
        }
    }

    pub fn transform(&self, t: &Transform) -> Self {
        Self {
            name: self.name.clone(),
            pose: Pose::new(t.apply(self.pose.at), t.apply_heading(self.pose.heading)),
        }
    }
}

fn find_port(cell: &str, ports: &[Port], name: &str) -> LayoutResult<Pose> {
    ports
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.pose)
        .ok_or_else(|| LayoutError::MissingPort {
            cell: cell.to_string(),
            port: name.to_string(),
        })
}

/// An edge coupler on the chip boundary and the net behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgePort {
    pub index: usize,
    pub label: String,
    pub net: String,
    pub at: Point,
}

/// A drawn cell together with its ports.
#[derive(Debug, Clone)]
pub struct Block {
    pub cell: Ptr<Cell>,
    pub ports: Vec<Port>,
}

impl Block {
    pub fn new(cell: Ptr<Cell>) -> Self {
        Self {
            cell,
            ports: Vec::new(),
        }
    }

    pub fn with_port(mut self, name: impl Into<ArcStr>, pose: Pose) -> Self {
        self.ports.push(Port::new(name, pose));
        self
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.cell.name
    }

    pub fn port(&self, name: &str) -> LayoutResult<Pose> {
        find_port(&self.cell.name, &self.ports, name)
    }

    /// Instantiates the block at `loc` with `orientation`.
    pub fn place(&self, loc: Point, orientation: Orientation) -> Placed {
        let inst = Instance::new(Ptr::clone(&self.cell), loc).with_orientation(orientation);
        let t = inst.transform();
        Placed {
            ports: self.ports.iter().map(|p| p.transform(&t)).collect(),
            inst,
        }
    }

    /// Instantiates the block so that port `name` lands on `target`,
    /// pointing along `target.heading`. With `reflect` set the block is
    /// mirrored across its x axis before it is turned.
    pub fn place_port_at(&self, name: &str, target: Pose, reflect: bool) -> LayoutResult<Placed> {
        let port = self.port(name)?;
        let base = if reflect {
            Orientation::reflected(0.0)
        } else {
            Orientation::IDENTITY
        };
        let turn = target.heading.angle() - base.apply_heading(port.heading).angle();
        let orientation = Orientation::rotated(turn).compose(&base);
        let loc = target.at - orientation.apply(port.at);
        Ok(self.place(loc, orientation))
    }
}

/// A placed block with its ports mapped into the parent frame.
#[derive(Debug, Clone)]
pub struct Placed {
    pub inst: Instance,
    pub ports: Vec<Port>,
}

impl Placed {
    pub fn port(&self, name: &str) -> LayoutResult<Pose> {
        find_port(&self.inst.cell.name, &self.ports, name)
    }

    /// Adds the instance to `cell` and hands back the mapped ports.
    pub fn add_to(self, cell: &mut Cell) -> Vec<Port> {
        cell.add_inst(self.inst);
        self.ports
    }
}
