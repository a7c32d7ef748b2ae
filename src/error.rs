use std::path::PathBuf;
use thiserror::Error;

/// Failures a caller may want to tell apart from generic I/O or parse errors.
///
/// Everything else travels as `anyhow::Error`; these variants can be recovered
/// with `err.downcast_ref::<PipelineError>()`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input file lacks columns a stage depends on.
    #[error("{} is missing required column(s): {}", path.display(), missing.join(", "))]
    MissingColumns {
        path: PathBuf,
        missing: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no files found for: {0}")]
    NoInputFiles(String),

    #[error("unparseable timestamp: {value:?}")]
    UnparseableTimestamp { value: String },
}
