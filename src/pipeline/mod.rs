//! The command-line stages of the link pipeline.
//!
//! Each stage reads delimited files, runs one step over the in-memory table and
//! writes its results next to its input:
//!
//! 1. [`extract`]: corpus -> `_links.csv` + `_dictionary.csv`
//! 2. [`resolve`]: dictionary, resolved in place (+ `.tmp`, `_grouped.csv`)
//! 3. [`canonicalize`]: dictionary -> `_processed.csv`
//! 4. [`report`]: links + processed dictionary -> archive links and counts
//! 5. [`link_stats`]: corpus + dictionary + links -> external-link statistics
//!
//! [`filter`] trims any table by date range and columns.

pub mod canonicalize;
pub mod extract;
pub mod filter;
pub mod link_stats;
pub mod report;
pub mod resolve;

pub use canonicalize::run_canonicalize;
pub use extract::run_extract;
pub use filter::{parse_utc_offset, run_filter, FilterOptions};
pub use link_stats::{run_link_stats, Period};
pub use report::run_report;
pub use resolve::run_resolve;
