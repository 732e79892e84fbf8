use crate::error::LayoutResult;
use crate::layout::PicLib;
use crate::route::Pose;

use super::Block;

/// A foundry device with the ports listed in the technology.
pub fn foundry_block(lib: &mut PicLib, name: &str) -> LayoutResult<Block> {
    let cell = lib.foundry_cell(name)?;
    let tech = lib.tech();
    let fc = tech.foundry_cell(name)?;
    Ok(fc
        .ports
        .iter()
        .fold(Block::new(cell), |b, p| b.with_port(p.name.as_str(), Pose::new(p.at, p.heading))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Heading, Point};
    use crate::tech::{AIST, FOUNDRY_GC, MMI_1X2};

    #[test]
    fn test_foundry_ports() {
        let mut lib = PicLib::new(AIST.clone());
        let mmi = foundry_block(&mut lib, MMI_1X2).unwrap();
        assert_eq!(mmi.ports.len(), 3);
        let gc = foundry_block(&mut lib, FOUNDRY_GC).unwrap();
        let wg = gc.port("wg").unwrap();
        assert_eq!(wg.heading, Heading::East);
        assert_eq!(wg.at, Point::new(217.0, 0.0));
        assert!(gc.cell.foundry.is_some());
        assert!(foundry_block(&mut lib, "AIST_RING").is_err());
    }
}
