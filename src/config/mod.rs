use std::path::{Path, PathBuf};

pub mod chip;
pub mod merge;

/// Resolves `path` against the directory holding the config file.
pub(crate) fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.parent().unwrap_or_else(|| Path::new(".")).join(path)
    }
}
