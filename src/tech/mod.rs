//! Process technology: layer map, process constants and foundry cells.

use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::geometry::{Heading, Point, Rect};

const AIST_TECH_TOML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tech/aist/tech.toml"
));

lazy_static! {
    /// The built-in silicon photonics technology.
    pub static ref AIST: Arc<TechConfig> = Arc::new(tech_config());
}

fn tech_config() -> TechConfig {
    TechConfig::from_toml(AIST_TECH_TOML).expect("failed to load built-in AIST tech config")
}

/// A GDS layer/datatype pair.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "layernum")]
    pub layer: i16,
    #[serde(default)]
    pub datatype: i16,
}

impl LayerSpec {
    #[inline]
    pub const fn new(layer: i16, datatype: i16) -> Self {
        Self { layer, datatype }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub desc: String,
    #[serde(flatten)]
    pub spec: LayerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layers {
    pub chip: LayerConfig,
    pub siwg: LayerConfig,
    pub np: LayerConfig,
    pub pp: LayerConfig,
    pub npp: LayerConfig,
    pub ppp: LayerConfig,
    pub ct2pn: LayerConfig,
    pub met: LayerConfig,
    pub tin: LayerConfig,
    pub ct2tin: LayerConfig,
    pub rib: LayerConfig,
    pub pw: LayerConfig,
    pub dw: LayerConfig,
    pub ssc: LayerConfig,
    pub nodmy: LayerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveguideConfig {
    pub width: f64,
    pub radius: f64,
    /// Straight section padding both ends of every bend.
    pub dr: f64,
    /// Center-to-center spacing of parallel routing waveguides.
    pub routing_pitch: f64,
}

impl WaveguideConfig {
    /// Offset of a 90 degree bend along each axis.
    #[inline]
    pub fn bend_size(&self) -> f64 {
        self.radius + self.dr
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SscConfig {
    pub dicing_length: f64,
    pub width_small: f64,
    pub length: f64,
    pub pitch: f64,
    pub box_half_height: f64,
}

impl SscConfig {
    /// Distance from the chip edge to the waveguide end of a spot-size converter.
    #[inline]
    pub fn reach(&self) -> f64 {
        self.length + self.dicing_length
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub size: f64,
    pub port_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfPadConfig {
    pub pitch: f64,
    pub gap: f64,
    pub sig_width: f64,
    pub gnd_width: f64,
    pub gap_width: f64,
    pub taper_length: f64,
    pub taper_end: f64,
    /// Probe window inset from the pad metal.
    pub window_inset: f64,
    /// Minimum space between a probe window and the neighbouring pad.
    pub min_window_space: f64,
}

impl RfPadConfig {
    #[inline]
    pub fn pad_size(&self) -> f64 {
        self.pitch - self.gap_width
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpwConfig {
    pub pad_size: f64,
    pub pitch: f64,
    pub taper_length: f64,
    pub sig_width: f64,
    pub gnd_width: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub at: Point,
    pub heading: Heading,
}

/// A cell supplied by the foundry PDK, known to the generator only by
/// its name, footprint and optical ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundryCell {
    pub name: String,
    pub bbox: Rect,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

impl FoundryCell {
    pub fn port(&self, name: &str) -> ConfigResult<&PortSpec> {
        self.ports
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownPort {
                cell: self.name.clone(),
                port: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechConfig {
    pub tech: String,
    pub layers: Layers,
    pub waveguide: WaveguideConfig,
    pub ssc: SscConfig,
    pub label: LabelConfig,
    pub rf_pad: RfPadConfig,
    pub cpw: CpwConfig,
    #[serde(default)]
    pub foundry: Vec<FoundryCell>,
}

impl TechConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_toml(&txt)
    }

    pub fn from_toml(s: &str) -> ConfigResult<Self> {
        let tc: TechConfig = toml::from_str(s)?;
        tc.validate()?;
        Ok(tc)
    }

    fn validate(&self) -> ConfigResult<()> {
        let wg = &self.waveguide;
        if wg.width <= 0.0 || wg.radius <= 0.0 || wg.dr < 0.0 {
            return Err(ConfigError::Invalid(
                "waveguide width and radius must be positive".to_string(),
            ));
        }
        if self.ssc.width_small <= 0.0 || self.ssc.pitch <= 2.0 * wg.bend_size() {
            return Err(ConfigError::Invalid(format!(
                "SSC pitch must exceed two bend sizes ({} um)",
                2.0 * wg.bend_size()
            )));
        }
        Ok(())
    }

    pub fn foundry_cell(&self, name: &str) -> ConfigResult<&FoundryCell> {
        self.foundry
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigError::UnknownFoundryCell(name.to_string()))
    }
}

/// Names of the foundry cells the block generators reference.
pub const MMI_2X2: &str = "AIST_MMI_2x2";
pub const MMI_1X2: &str = "AIST_MMI_1x2";
pub const FOUNDRY_GC: &str = "AIST_GC";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tech_config() {
        let tc = &*AIST;
        assert_eq!(tc.layers.siwg.spec, LayerSpec::new(30, 0));
        assert_eq!(tc.layers.nodmy.spec.layer, 60);
        assert_eq!(tc.waveguide.width, 0.44);
        assert_eq!(tc.waveguide.bend_size(), 10.1);
        assert_eq!(tc.ssc.reach(), 150.0);
        assert_eq!(tc.rf_pad.pad_size(), 116.0);
        let mmi = tc.foundry_cell(MMI_2X2).unwrap();
        assert_eq!(mmi.port("out1").unwrap().at, Point::new(0.55, 41.016));
        assert!(tc.foundry_cell("nonexistent").is_err());
    }

    #[test]
    fn test_rejects_tight_ssc_pitch() {
        let txt = AIST_TECH_TOML.replace("pitch = 127.0", "pitch = 15.0");
        assert!(matches!(
            TechConfig::from_toml(&txt),
            Err(ConfigError::Invalid(_))
        ));
    }
}
