pub mod logger;

use std::path::{Path, PathBuf};

/// Derives a sibling output file: `results/data.csv` + `_links` -> `results/data_links.csv`
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let raw = input.to_string_lossy();
    let stem = raw.strip_suffix(".csv").unwrap_or(&raw);
    PathBuf::from(format!("{}{}.csv", stem, suffix))
}

/// Path of the per-batch checkpoint written next to `input`
pub fn checkpoint_path(input: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", input.to_string_lossy()))
}
