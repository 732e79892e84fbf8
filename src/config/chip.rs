use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::blocks::chip::ChipParams;
use crate::error::{ConfigError, ConfigResult};
use crate::tech::{TechConfig, AIST};

use super::resolve;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipConfig {
    /// Name of the top cell and of the output files.
    pub name: String,
    /// Technology file; the built-in AIST technology when absent.
    #[serde(default)]
    pub tech: Option<PathBuf>,
    /// GDS library holding the foundry cells.
    #[serde(default)]
    pub pdk_gds: Option<PathBuf>,
    #[serde(default)]
    pub chip: ChipParams,
}

impl ChipConfig {
    pub fn tech_config(&self) -> ConfigResult<Arc<TechConfig>> {
        match &self.tech {
            Some(path) => Ok(Arc::new(TechConfig::load(path)?)),
            None => Ok(AIST.clone()),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("chip name must not be empty".to_string()));
        }
        let c = &self.chip;
        if c.width <= 0.0 || c.height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "chip size must be positive (got {} x {})",
                c.width, c.height
            )));
        }
        if c.ssc_y0 <= 0.0 || c.ssc_y0 >= c.height {
            return Err(ConfigError::Invalid(format!(
                "first SSC port at y = {} lies outside the chip",
                c.ssc_y0
            )));
        }
        if let Some(region) = c.regions.iter().find(|r| r.name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "region at {:?} has no name",
                region.rect
            )));
        }
        Ok(())
    }
}

/// Reads a chip config, resolving relative paths against its directory.
pub fn parse_chip_config(path: impl AsRef<Path>) -> ConfigResult<ChipConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut config: ChipConfig = toml::from_str(&contents)?;
    config.tech = config.tech.map(|p| resolve(path, &p));
    config.pdk_gds = config.pdk_gds.map(|p| resolve(path, &p));
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_chip_config() -> ConfigResult<()> {
        let file = write_config(
            r#"
name = "mpw_chip"
pdk_gds = "pdk/aist.gds"

[chip]
height = 8000.0
markers = [[100.0, 7500.0]]

[[chip.regions]]
name = "party_b"
rect = [[0.0, 0.0], [2000.0, 3000.0]]

[[chip.modulators.devices]]
pin_length = 200.0
"#,
        );
        let config = parse_chip_config(file.path())?;
        assert_eq!(config.name, "mpw_chip");
        assert_eq!(config.chip.height, 8000.0);
        assert_eq!(config.chip.width, 5000.0);
        assert_eq!(config.chip.regions[0].rect.p1.x, 2000.0);
        assert_eq!(config.chip.modulators.devices.len(), 1);
        let pdk = config.pdk_gds.unwrap();
        assert!(pdk.is_absolute());
        assert!(pdk.ends_with("pdk/aist.gds"));
        Ok(())
    }

    #[test]
    fn test_parse_chip_config_invalid() {
        let file = write_config("name = \"bad\"\n[chip]\nheight = -1.0\n");
        assert!(matches!(parse_chip_config(file.path()), Err(ConfigError::Invalid(_))));

        let file = write_config("name = \"bad\"\n[chip]\nssc_y0 = 20000.0\n");
        assert!(matches!(parse_chip_config(file.path()), Err(ConfigError::Invalid(_))));

        let file = write_config("[chip]\nheight = 100.0\n");
        assert!(matches!(parse_chip_config(file.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_builtin_tech() -> ConfigResult<()> {
        let file = write_config("name = \"chip\"\n");
        let config = parse_chip_config(file.path())?;
        assert_eq!(config.tech_config()?.ssc.pitch, 127.0);
        Ok(())
    }

    #[test]
    fn test_default_chip_config() -> ConfigResult<()> {
        let config = parse_chip_config(concat!(env!("CARGO_MANIFEST_DIR"), "/picgen.toml"))?;
        assert_eq!(config.name, "picgen_chip");
        assert_eq!(config.chip.modulators.devices.len(), 5);
        assert_eq!(config.chip.cpw.len(), 6);
        assert!(config.chip.passive.is_some());
        Ok(())
    }
}
