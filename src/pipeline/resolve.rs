use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::table::{format_bool, parse_flag, Table};
use crate::url_resolver::{RedirectResolver, ResolveEntry, ResolveOutcome};
use crate::utils::{checkpoint_path, output_path};

pub const EXPANDED_URL: &str = "expanded_url";
pub const DOMAIN: &str = "domain";
pub const ERROR_EXPANDING: &str = "error_expanding";

#[derive(Debug, Default)]
pub struct ResolveSummary {
    pub rows: usize,
    pub errors_before: usize,
    pub errors_after: usize,
    pub transport_errors: usize,
    pub malformed_redirects: usize,
    pub checkpoint_path: PathBuf,
    pub grouped_path: PathBuf,
}

struct Columns {
    url: usize,
    expanded_url: usize,
    domain: usize,
    error_expanding: usize,
}

/// Adds the resolution columns a fresh dictionary may lack; a missing flag
/// column marks every row as still failing.
fn prepare(table: &mut Table, path: &Path) -> Result<Columns> {
    let url = table.require_columns(path, &["url"])?[0];
    if table.column_index(ERROR_EXPANDING).is_none() {
        warn!("{} has no {} column, resolving every row", path.display(), ERROR_EXPANDING);
    }
    Ok(Columns {
        url,
        expanded_url: table.ensure_column(EXPANDED_URL, ""),
        domain: table.ensure_column(DOMAIN, ""),
        error_expanding: table.ensure_column(ERROR_EXPANDING, format_bool(true)),
    })
}

fn count_errors(table: &Table, col: usize) -> usize {
    table.rows().iter().filter(|r| parse_flag(&r[col])).count()
}

/// Resolves every failing row of a URL dictionary, in place.
///
/// Rows go out in chunks of `chunk_size`; each finished chunk is appended to
/// `<file>.tmp` before the next one starts. The input file is then rewritten
/// with every row in its original order, and `<stem>_grouped.csv` sums the
/// numeric columns per `expanded_url`.
pub async fn run_resolve(
    path: &Path,
    config: &PipelineConfig,
    resolver: &RedirectResolver,
) -> Result<ResolveSummary> {
    let delimiter = config.csv.delimiter_byte()?;
    let chunk_size = config.resolver.chunk_size.max(1);

    let mut table = Table::read(path, delimiter)?;
    let cols = prepare(&mut table, path)?;
    let errors_before = count_errors(&table, cols.error_expanding);
    println!("Re-analyzing URLs for error_expanding == True");

    let mut summary = ResolveSummary {
        rows: table.len(),
        errors_before,
        checkpoint_path: checkpoint_path(path),
        grouped_path: output_path(path, "_grouped"),
        ..ResolveSummary::default()
    };

    let headers = table.headers().to_vec();
    let total = table.len();
    for (chunk_idx, rows) in table.rows_mut().chunks_mut(chunk_size).enumerate() {
        let start = chunk_idx * chunk_size;
        println!("Analyzing rows from {} to {}", start, start + chunk_size);

        let entries: Vec<ResolveEntry> = rows
            .iter()
            .map(|row| ResolveEntry {
                url: row[cols.url].clone(),
                expanded_url: row[cols.expanded_url].clone(),
                domain: row[cols.domain].clone(),
                error_expanding: parse_flag(&row[cols.error_expanding]),
            })
            .collect();
        let skipped = entries.iter().filter(|e| !e.error_expanding).count();
        println!("Skipped re-analysis for {} rows as error_expanding == False", skipped);

        let items = resolver.resolve_batch(entries).await;
        for (row, item) in rows.iter_mut().zip(items) {
            let Some(outcome) = item.outcome else {
                continue;
            };
            match outcome {
                ResolveOutcome::TransportError(_) => summary.transport_errors += 1,
                ResolveOutcome::MalformedRedirect(_) => summary.malformed_redirects += 1,
                ResolveOutcome::Resolved | ResolveOutcome::NoRedirect => {}
            }
            row[cols.expanded_url] = item.entry.expanded_url;
            row[cols.domain] = item.entry.domain;
            row[cols.error_expanding] = format_bool(item.entry.error_expanding).to_string();
        }

        println!("--> writing tmp data...");
        let mut checkpoint = Table::new(headers.iter().cloned());
        for row in rows.iter() {
            checkpoint.push_row(row.clone());
        }
        checkpoint
            .append(&summary.checkpoint_path, delimiter, chunk_idx == 0)
            .context("Failed to write checkpoint")?;
        info!(
            "Chunk {} done ({} of {} rows)",
            chunk_idx + 1,
            (start + rows.len()).min(total),
            total
        );
    }
    println!("Done processing!");

    println!("Writing raw data to {}...", path.display());
    table.write(path, delimiter)?;

    if let Some(grouped) = table.group_sum(EXPANDED_URL) {
        println!("Writing grouped data by URL to {}...", summary.grouped_path.display());
        grouped.write(&summary.grouped_path, delimiter)?;
    }

    summary.errors_after = count_errors(&table, cols.error_expanding);
    println!(
        "Done! Errors before: {} & errors after: {}.",
        summary.errors_before, summary.errors_after
    );
    info!(
        "Resolution finished: {} transport errors, {} malformed redirects",
        summary.transport_errors, summary.malformed_redirects
    );
    Ok(summary)
}
