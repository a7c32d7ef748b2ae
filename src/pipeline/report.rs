use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::extract::{TOTAL_RECORDS_IN_SET, URL};
use crate::config::PipelineConfig;
use crate::table::{parse_timestamp, NumericSum, Table};
use crate::utils::output_path;

const PROCESSED_COLUMNS: [&str; 2] = ["clean_expanded_url", "root_domain"];

/// Files written by [`run_report`]
#[derive(Debug)]
pub struct ReportOutputs {
    pub archive_path: PathBuf,
    pub by_domain_path: PathBuf,
    pub by_month_path: PathBuf,
    pub by_user_path: PathBuf,
}

/// Links left-joined with the processed dictionary, plus parsed timestamps
pub struct MergedLinks {
    pub table: Table,
    pub timestamps: Vec<DateTime<FixedOffset>>,
}

/// Left-joins `links` with `processed` on `url`; the first processed row of
/// a url wins and unmatched links get empty cells.
pub fn merge_links(
    links: &Table,
    links_path: &Path,
    processed: &Table,
    processed_path: &Path,
    config: &PipelineConfig,
) -> Result<MergedLinks> {
    let cols = &config.records;
    let link_idx = links.require_columns(
        links_path,
        &[
            cols.id.as_str(),
            cols.timestamp.as_str(),
            cols.author.as_str(),
            cols.weight.as_str(),
            URL,
        ],
    )?;
    let processed_url = processed.require_columns(processed_path, &[URL])?[0];
    processed.require_columns(processed_path, &PROCESSED_COLUMNS)?;

    let joined: Vec<usize> = (0..processed.headers().len())
        .filter(|&i| {
            let name = processed.headers()[i].as_str();
            name != URL && name != TOTAL_RECORDS_IN_SET && links.column_index(name).is_none()
        })
        .collect();

    let mut by_url: HashMap<&str, usize> = HashMap::new();
    for (i, row) in processed.rows().iter().enumerate() {
        by_url.entry(row[processed_url].as_str()).or_insert(i);
    }

    let mut headers = links.headers().to_vec();
    headers.extend(joined.iter().map(|&i| processed.headers()[i].clone()));
    let mut table = Table::new(headers);
    let mut timestamps = Vec::with_capacity(links.len());

    let (timestamp_col, url_col) = (link_idx[1], link_idx[4]);
    for (line, row) in links.rows().iter().enumerate() {
        let timestamp = parse_timestamp(&row[timestamp_col]).with_context(|| {
            format!("Bad timestamp on row {} of {}", line + 1, links_path.display())
        })?;
        timestamps.push(timestamp);

        let mut cells = row.clone();
        match by_url.get(row[url_col].as_str()) {
            Some(&p) => cells.extend(joined.iter().map(|&i| processed.rows()[p][i].clone())),
            None => cells.extend(joined.iter().map(|_| String::new())),
        }
        table.push_row(cells);
    }
    let unmatched = table.len()
        - links
            .rows()
            .iter()
            .filter(|r| by_url.contains_key(r[url_col].as_str()))
            .count();
    debug!("{} of {} links have no processed dictionary row", unmatched, links.len());

    Ok(MergedLinks { table, timestamps })
}

fn is_excluded(root_domain: &str, excluded: &HashSet<String>) -> bool {
    excluded.contains(&root_domain.to_ascii_lowercase())
}

/// One row per url with its oldest sighting and a Wayback Machine link.
///
/// Rows are ordered newest first; links to excluded root domains are left out.
pub fn archive_table(merged: &MergedLinks, config: &PipelineConfig) -> Result<Table> {
    let table = &merged.table;
    let url = table.require_columns(Path::new("merged links"), &[URL])?[0];
    let clean = table.require_columns(Path::new("merged links"), &PROCESSED_COLUMNS)?;
    let (clean_col, root_col) = (clean[0], clean[1]);
    let excluded: HashSet<String> = config
        .reports
        .excluded_root_domains
        .iter()
        .map(|d| d.to_ascii_lowercase())
        .collect();
    let base = config.reports.archive_base.trim_end_matches('/');

    // Stable sort, newest first
    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by(|&a, &b| merged.timestamps[b].cmp(&merged.timestamps[a]));

    // Keep the last position of each url in that order, i.e. its oldest row
    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for (pos, &row) in order.iter().enumerate() {
        last_seen.insert(table.rows()[row][url].as_str(), pos);
    }

    let mut headers = table.headers().to_vec();
    headers.push("archive_url".to_string());
    let mut archive = Table::new(headers);
    for (pos, &row) in order.iter().enumerate() {
        let cells = &table.rows()[row];
        if last_seen.get(cells[url].as_str()) != Some(&pos) {
            continue;
        }
        if is_excluded(&cells[root_col], &excluded) {
            continue;
        }
        let day = merged.timestamps[row].format("%Y%m%d");
        let mut out = cells.clone();
        out.push(format!("{}/{}/{}", base, day, cells[clean_col]));
        archive.push_row(out);
    }
    Ok(archive)
}

#[derive(Default)]
struct Aggregate<'a> {
    links: usize,
    records: HashSet<&'a str>,
    urls: HashSet<&'a str>,
    weight: NumericSum,
}

/// Counts links per key: `link_count`, `unique_records`, `unique_urls`, `weight_sum`.
///
/// Sorted by `link_count` descending, then key.
fn aggregate<'a, F>(
    merged: &'a MergedLinks,
    config: &PipelineConfig,
    key_name: &str,
    mut key: F,
) -> Result<Table>
where
    F: FnMut(usize, &'a [String]) -> String,
{
    let table = &merged.table;
    let cols = &config.records;
    let idx = table.require_columns(
        Path::new("merged links"),
        &[cols.id.as_str(), cols.weight.as_str(), URL, "clean_expanded_url", "root_domain"],
    )?;
    let (id, weight, url, clean, root) = (idx[0], idx[1], idx[2], idx[3], idx[4]);
    let excluded: HashSet<String> = config
        .reports
        .excluded_root_domains
        .iter()
        .map(|d| d.to_ascii_lowercase())
        .collect();

    let mut groups: HashMap<String, Aggregate<'a>> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        if is_excluded(&row[root], &excluded) {
            continue;
        }
        let group = groups.entry(key(i, row.as_slice())).or_default();
        group.links += 1;
        group.records.insert(row[id].as_str());
        // Unresolved links count under their raw url
        let target = if row[clean].is_empty() { &row[url] } else { &row[clean] };
        group.urls.insert(target.as_str());
        group.weight.add(&row[weight]);
    }

    let mut groups: Vec<(String, Aggregate)> = groups.into_iter().collect();
    groups.sort_by(|a, b| b.1.links.cmp(&a.1.links).then_with(|| a.0.cmp(&b.0)));

    let mut out = Table::new([key_name, "link_count", "unique_records", "unique_urls", "weight_sum"]);
    for (key, group) in groups {
        out.push_row(vec![
            key,
            group.links.to_string(),
            group.records.len().to_string(),
            group.urls.len().to_string(),
            group.weight.render(),
        ]);
    }
    Ok(out)
}

pub fn by_domain_table(merged: &MergedLinks, config: &PipelineConfig) -> Result<Table> {
    let root = merged
        .table
        .require_columns(Path::new("merged links"), &["root_domain"])?[0];
    aggregate(merged, config, "root_domain", |_, row| row[root].clone())
}

pub fn by_month_table(merged: &MergedLinks, config: &PipelineConfig) -> Result<Table> {
    aggregate(merged, config, "month", |i, _| {
        merged.timestamps[i].format("%Y-%m").to_string()
    })
}

pub fn by_user_table(merged: &MergedLinks, config: &PipelineConfig) -> Result<Table> {
    let author = merged
        .table
        .require_columns(Path::new("merged links"), &[config.records.author.as_str()])?[0];
    aggregate(merged, config, &config.records.author, |_, row| row[author].clone())
}

/// Joins links with the processed dictionary and writes the archive table
/// and the per-domain, per-month and per-user link counts.
pub fn run_report(
    links_path: &Path,
    processed_path: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<ReportOutputs> {
    let delimiter = config.csv.delimiter_byte()?;

    println!("Reading links from {}...", links_path.display());
    let links = Table::read(links_path, delimiter)?;
    println!("Reading processed expanded URL data from {}...", processed_path.display());
    let processed = Table::read(processed_path, delimiter)?;

    let merged = merge_links(&links, links_path, &processed, processed_path, config)?;

    println!("Adding archive.org links...");
    let archive = archive_table(&merged, config)?;
    let outputs = ReportOutputs {
        archive_path: output_path(output, "_with_archived_links"),
        by_domain_path: output_path(output, "_by_domain"),
        by_month_path: output_path(output, "_by_month"),
        by_user_path: output_path(output, "_by_user"),
    };
    println!("Saving data to {}...", outputs.archive_path.display());
    archive.write(&outputs.archive_path, delimiter)?;

    for (table, path) in [
        (by_domain_table(&merged, config)?, &outputs.by_domain_path),
        (by_month_table(&merged, config)?, &outputs.by_month_path),
        (by_user_table(&merged, config)?, &outputs.by_user_path),
    ] {
        println!("Saving data to {}...", path.display());
        table.write(path, delimiter)?;
    }
    info!(
        "Report written: {} links, {} archived urls",
        merged.table.len(),
        archive.len()
    );
    Ok(outputs)
}
