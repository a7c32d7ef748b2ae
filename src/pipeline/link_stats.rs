use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::extract::URL;
use crate::config::PipelineConfig;
use crate::table::{format_bool, parse_timestamp, NumericSum, Table};
use crate::url_canonicalizer::SuffixList;
use crate::utils::output_path;

/// Granularity of the `_grouped` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    Month,
    Day,
    Hour,
}

impl Period {
    /// Sort key and label, e.g. `3/2021`, `3/4/2021` or `3/4/2021 9:00:00`
    fn bucket(self, ts: &DateTime<FixedOffset>) -> (NaiveDateTime, String) {
        let local = ts.naive_local();
        let date = local.date();
        match self {
            Period::Month => (
                date.with_day(1)
                    .and_then(|first| first.and_hms_opt(0, 0, 0))
                    .unwrap_or(local),
                format!("{}/{}", date.month(), date.year()),
            ),
            Period::Day => (
                date.and_hms_opt(0, 0, 0).unwrap_or(local),
                format!("{}/{}/{}", date.month(), date.day(), date.year()),
            ),
            Period::Hour => (
                date.and_hms_opt(local.hour(), 0, 0).unwrap_or(local),
                format!("{}/{}/{} {}:00:00", date.month(), date.day(), date.year(), local.hour()),
            ),
        }
    }
}

#[derive(Debug)]
pub struct LinkStatsOutputs {
    pub flags_path: PathBuf,
    pub grouped_path: PathBuf,
    pub stats_path: PathBuf,
    pub duplicates_dropped: usize,
}

/// Drops rows identical to an earlier row; returns the count dropped
fn drop_duplicate_rows(table: &Table) -> (Table, usize) {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let deduped = table.filter_rows(|row| seen.insert(row.to_vec()));
    let dropped = table.len() - deduped.len();
    (deduped, dropped)
}

/// Ids of records with at least one link outside the excluded root domains
pub fn external_record_ids(
    dictionary: &Table,
    dictionary_path: &Path,
    links: &Table,
    links_path: &Path,
    config: &PipelineConfig,
    suffixes: &SuffixList,
) -> Result<HashSet<String>> {
    let idx = dictionary.require_columns(dictionary_path, &[URL, "expanded_url"])?;
    let (dict_url, dict_expanded) = (idx[0], idx[1]);
    let idx = links.require_columns(links_path, &[config.records.id.as_str(), URL])?;
    let (link_id, link_url) = (idx[0], idx[1]);

    let mut root_by_url: HashMap<&str, String> = HashMap::new();
    for row in dictionary.rows() {
        root_by_url
            .entry(row[dict_url].as_str())
            .or_insert_with(|| suffixes.split_url_str(&row[dict_expanded]).root_domain);
    }
    let excluded: HashSet<String> = config
        .reports
        .excluded_root_domains
        .iter()
        .map(|d| d.to_ascii_lowercase())
        .collect();

    // Unresolved or unknown links count as external
    Ok(links
        .rows()
        .iter()
        .filter(|row| {
            root_by_url
                .get(row[link_url].as_str())
                .map_or(true, |root| !excluded.contains(root))
        })
        .map(|row| row[link_id].clone())
        .collect())
}

#[derive(Default)]
struct Bucket<'a> {
    records: HashSet<&'a str>,
    authors: HashSet<&'a str>,
    weight: NumericSum,
}

impl<'a> Bucket<'a> {
    fn add(&mut self, id: &'a str, author: &'a str, weight: &str) {
        self.records.insert(id);
        self.authors.insert(author);
        self.weight.add(weight);
    }

    /// Empty buckets render as zeros
    fn cells(&self) -> [String; 3] {
        [
            self.records.len().to_string(),
            self.authors.len().to_string(),
            self.weight.render(),
        ]
    }
}

/// Per-period record counts split by the external-link flag
pub fn grouped_table(flags: &Table, timestamps: &[DateTime<FixedOffset>], period: Period) -> Table {
    let mut headers = vec!["date".to_string()];
    for suffix in ["_with_external", "_without_external", "_total"] {
        for column in ["records_in_set", "unique_authors", "weight_sum"] {
            headers.push(format!("{}{}", column, suffix));
        }
    }
    let mut out = Table::new(headers);

    // flags columns: id, author, weight, timestamp, has_external_link
    let mut buckets: BTreeMap<NaiveDateTime, (String, [Bucket; 3])> = BTreeMap::new();
    for (row, ts) in flags.rows().iter().zip(timestamps) {
        let (key, label) = period.bucket(ts);
        let entry = buckets.entry(key).or_insert_with(|| (label, Default::default()));
        let split = if row[4] == format_bool(true) { 0 } else { 1 };
        entry.1[split].add(&row[0], &row[1], &row[2]);
        entry.1[2].add(&row[0], &row[1], &row[2]);
    }

    for (label, groups) in buckets.into_values() {
        let mut cells = vec![label];
        for group in &groups {
            cells.extend(group.cells());
        }
        out.push_row(cells);
    }
    out
}

fn stats_row(kind: &str, rows: &[&Vec<String>]) -> Vec<String> {
    let mut weight = NumericSum::default();
    let mut authors: HashSet<&str> = HashSet::new();
    for row in rows {
        weight.add(&row[2]);
        authors.insert(row[1].as_str());
    }
    vec![
        kind.to_string(),
        rows.len().to_string(),
        weight.render(),
        authors.len().to_string(),
    ]
}

/// Whole-corpus totals against totals of records with external links
pub fn stats_table(flags: &Table) -> Table {
    let all: Vec<&Vec<String>> = flags.rows().iter().collect();
    let external: Vec<&Vec<String>> = all
        .iter()
        .copied()
        .filter(|row| row[4] == format_bool(true))
        .collect();
    let mut out = Table::new(["type", "total_record_count", "total_weight", "unique_authors"]);
    out.push_row(stats_row("all_records", &all));
    out.push_row(stats_row("records_with_external_links", &external));
    out
}

/// Flags every corpus record that links outside the excluded domains and
/// writes the flag table, per-period counts and overall stats.
pub fn run_link_stats(
    corpus_path: &Path,
    dictionary_path: &Path,
    links_path: &Path,
    output: &Path,
    period: Period,
    config: &PipelineConfig,
    suffixes: &SuffixList,
) -> Result<LinkStatsOutputs> {
    let delimiter = config.csv.delimiter_byte()?;
    let cols = &config.records;

    println!("Reading corpus from {}...", corpus_path.display());
    let corpus = Table::read(corpus_path, delimiter)?;
    let idx = corpus.require_columns(
        corpus_path,
        &[
            cols.id.as_str(),
            cols.author.as_str(),
            cols.weight.as_str(),
            cols.timestamp.as_str(),
        ],
    )?;
    let (corpus, duplicates_dropped) = drop_duplicate_rows(&corpus);
    if duplicates_dropped > 0 {
        println!(
            "> found {} duplicates in corpus, dropped them in-memory (input file was not affected).",
            duplicates_dropped
        );
    }

    println!("Reading dictionary from {}...", dictionary_path.display());
    let dictionary = Table::read(dictionary_path, delimiter)?;
    println!("Reading links from {}...", links_path.display());
    let links = Table::read(links_path, delimiter)?;

    let external = external_record_ids(
        &dictionary,
        dictionary_path,
        &links,
        links_path,
        config,
        suffixes,
    )?;
    debug!("{} records link outside the excluded domains", external.len());

    let mut flags = Table::new([
        cols.id.as_str(),
        cols.author.as_str(),
        cols.weight.as_str(),
        cols.timestamp.as_str(),
        "has_external_link",
    ]);
    let mut timestamps = Vec::with_capacity(corpus.len());
    for (line, row) in corpus.rows().iter().enumerate() {
        let ts = parse_timestamp(&row[idx[3]]).with_context(|| {
            format!("Bad timestamp on row {} of {}", line + 1, corpus_path.display())
        })?;
        timestamps.push(ts);
        flags.push_row(vec![
            row[idx[0]].clone(),
            row[idx[1]].clone(),
            row[idx[2]].clone(),
            row[idx[3]].clone(),
            format_bool(external.contains(&row[idx[0]])).to_string(),
        ]);
    }

    let outputs = LinkStatsOutputs {
        flags_path: output_path(output, "_all_records_with_external_link_flag"),
        grouped_path: output_path(output, "_grouped"),
        stats_path: output_path(output, "_stats"),
        duplicates_dropped,
    };
    println!("Saving dataframe to {}...", outputs.flags_path.display());
    flags.write(&outputs.flags_path, delimiter)?;

    println!("Saving dataframe to {}...", outputs.grouped_path.display());
    grouped_table(&flags, &timestamps, period).write(&outputs.grouped_path, delimiter)?;

    println!("Saving stats dataframe to {}...", outputs.stats_path.display());
    stats_table(&flags).write(&outputs.stats_path, delimiter)?;
    info!("Link stats written for {} records ({:?} buckets)", flags.len(), period);
    Ok(outputs)
}
