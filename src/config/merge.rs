use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::geometry::{Orientation, Point, Rect};

use super::resolve;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Name of the merged top cell and of the output library.
    pub name: String,
    pub sources: Vec<MergeSource>,
}

/// One library placed into the merged top cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSource {
    pub path: PathBuf,
    /// Top cell of the library.
    pub cell: String,
    /// New name for `cell`, applied before merging.
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub origin: Point,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub exclude: Vec<Exclusion>,
}

impl MergeSource {
    /// Name of the top cell once merged.
    pub fn top_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.cell)
    }
}

/// Removes the contents of `cell` that overlap `rect`, given in the
/// coordinates of `cell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub cell: String,
    pub rect: Rect,
}

impl MergeConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("nothing to merge".to_string()));
        }
        let mut tops = HashSet::new();
        for source in self.sources.iter() {
            let top = source.top_name();
            if top == self.name {
                return Err(ConfigError::Invalid(format!(
                    "source cell `{top}` has the name of the merged top cell"
                )));
            }
            if !tops.insert(top) {
                return Err(ConfigError::Invalid(format!(
                    "two sources place a cell named `{top}`; rename one of them"
                )));
            }
        }
        Ok(())
    }
}

pub fn parse_merge_config(path: impl AsRef<Path>) -> ConfigResult<MergeConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut config: MergeConfig = toml::from_str(&contents)?;
    for source in config.sources.iter_mut() {
        source.path = resolve(path, &source.path);
    }
    config.validate()?;
    Ok(config)
}
