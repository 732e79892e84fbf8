pub use anyhow::{anyhow, Result};

pub mod blocks;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod merge;
pub mod paths;
pub mod plan;
pub mod route;
pub mod tech;

pub const BUILD_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/build");

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use crate::BUILD_PATH;

    pub(crate) fn test_work_dir(name: &str) -> PathBuf {
        PathBuf::from(BUILD_PATH).join(name)
    }
}
