use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use super::extract::TOTAL_RECORDS_IN_SET;
use crate::config::PipelineConfig;
use crate::table::Table;
use crate::url_canonicalizer::Canonicalizer;
use crate::utils::output_path;

const OUTPUT_COLUMNS: [&str; 7] = [
    "url",
    "expanded_url",
    "clean_expanded_url",
    "domain",
    "root_domain",
    "sub_domain",
    "suffix",
];

/// Adds the canonical columns to a resolved dictionary
pub fn processed_table(
    dictionary: &Table,
    path: &Path,
    canonicalizer: &Canonicalizer,
) -> Result<Table> {
    let idx = dictionary.require_columns(path, &["url", "expanded_url", "domain"])?;
    let (url, expanded, domain) = (idx[0], idx[1], idx[2]);
    let total = dictionary.column_index(TOTAL_RECORDS_IN_SET);

    let mut headers = OUTPUT_COLUMNS.to_vec();
    if total.is_some() {
        headers.push(TOTAL_RECORDS_IN_SET);
    }
    let mut out = Table::new(headers);

    for row in dictionary.rows() {
        let canonical = canonicalizer.canonicalize(&row[expanded]);
        let mut cells = vec![
            row[url].clone(),
            row[expanded].clone(),
            canonical.clean_expanded_url,
            row[domain].clone(),
            canonical.root_domain,
            canonical.sub_domain,
            canonical.suffix,
        ];
        if let Some(total) = total {
            cells.push(row[total].clone());
        }
        out.push_row(cells);
    }
    Ok(out)
}

/// Writes `<stem>_processed.csv` next to the dictionary
pub fn run_canonicalize(
    path: &Path,
    config: &PipelineConfig,
    canonicalizer: &Canonicalizer,
) -> Result<PathBuf> {
    let delimiter = config.csv.delimiter_byte()?;

    println!("Reading expanded URL data from {}...", path.display());
    let dictionary = Table::read(path, delimiter)?;

    println!("Cleaning links...");
    let processed = processed_table(&dictionary, path, canonicalizer)?;
    let unresolved = processed.rows().iter().filter(|r| r[2].is_empty()).count();
    info!(
        "Canonicalized {} rows, {} without a usable expanded URL",
        processed.len(),
        unresolved
    );

    let save_path = output_path(path, "_processed");
    println!("Saving URL dictionary data to {}...", save_path.display());
    processed.write(&save_path, delimiter)?;
    Ok(save_path)
}
