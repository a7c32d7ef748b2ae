use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::extractor::UrlExtractor;
use crate::table::{format_bool, NumericSum, Table};
use crate::utils::output_path;

pub const URL: &str = "url";
pub const TOTAL_RECORDS_IN_SET: &str = "total_records_in_set";

/// Files written by [`run_extract`]
#[derive(Debug)]
pub struct ExtractOutputs {
    pub links_path: PathBuf,
    pub dictionary_path: PathBuf,
    pub link_count: usize,
    pub unique_urls: usize,
}

/// One row per link found in the corpus text: id, timestamp, author, weight, url
pub fn links_table(
    corpus: &Table,
    corpus_path: &Path,
    config: &PipelineConfig,
    extractor: &UrlExtractor,
) -> Result<Table> {
    let cols = &config.records;
    let idx = corpus.require_columns(
        corpus_path,
        &[
            cols.id.as_str(),
            cols.text.as_str(),
            cols.timestamp.as_str(),
            cols.author.as_str(),
            cols.weight.as_str(),
        ],
    )?;
    let (id, text, timestamp, author, weight) = (idx[0], idx[1], idx[2], idx[3], idx[4]);

    let mut links = Table::new([
        cols.id.as_str(),
        cols.timestamp.as_str(),
        cols.author.as_str(),
        cols.weight.as_str(),
        URL,
    ]);
    for row in corpus.rows() {
        for url in extractor.extract(&row[text]) {
            links.push_row(vec![
                row[id].clone(),
                row[timestamp].clone(),
                row[author].clone(),
                row[weight].clone(),
                url,
            ]);
        }
    }
    Ok(links)
}

/// Groups links by (url, author) into rows ready for resolution
pub fn dictionary_table(links: &Table, config: &PipelineConfig) -> Table {
    let cols = &config.records;
    let mut headers = vec![URL, cols.author.as_str(), cols.weight.as_str()];
    headers.extend([TOTAL_RECORDS_IN_SET, "expanded_url", "domain", "error_expanding"]);
    let mut dictionary = Table::new(headers);

    let (Some(url), Some(author), Some(weight)) = (
        links.column_index(URL),
        links.column_index(&cols.author),
        links.column_index(&cols.weight),
    ) else {
        return dictionary;
    };

    let mut groups: BTreeMap<(&str, &str), (NumericSum, usize)> = BTreeMap::new();
    for row in links.rows() {
        let entry = groups
            .entry((row[url].as_str(), row[author].as_str()))
            .or_default();
        entry.0.add(&row[weight]);
        entry.1 += 1;
    }

    for ((url, author), (weight, count)) in groups {
        dictionary.push_row(vec![
            url.to_string(),
            author.to_string(),
            weight.render(),
            count.to_string(),
            String::new(),
            String::new(),
            format_bool(true).to_string(),
        ]);
    }
    dictionary
}

/// Extracts every link from a corpus file.
///
/// Writes `<stem>_links.csv` and the URL dictionary `<stem>_dictionary.csv`.
pub fn run_extract(corpus_path: &Path, config: &PipelineConfig) -> Result<ExtractOutputs> {
    let delimiter = config.csv.delimiter_byte()?;
    let extractor = UrlExtractor::new(&config.extractor)?;

    println!("Reading corpus from {}...", corpus_path.display());
    let corpus = Table::read(corpus_path, delimiter)?;

    println!("Getting links from records...");
    let links = links_table(&corpus, corpus_path, config, &extractor)?;
    info!("Extracted {} links from {} records", links.len(), corpus.len());

    let links_path = output_path(corpus_path, "_links");
    println!("Saving links from records to {}...", links_path.display());
    links
        .write(&links_path, delimiter)
        .context("Failed to write links file")?;

    let dictionary = dictionary_table(&links, config);
    let dictionary_path = output_path(corpus_path, "_dictionary");
    println!("Saving URL dictionary to {}...", dictionary_path.display());
    dictionary
        .write(&dictionary_path, delimiter)
        .context("Failed to write URL dictionary")?;
    debug!("Dictionary holds {} (url, author) groups", dictionary.len());

    let unique_urls = {
        let mut urls: Vec<&str> = dictionary.rows().iter().map(|r| r[0].as_str()).collect();
        urls.dedup();
        urls.len()
    };
    Ok(ExtractOutputs {
        links_path,
        dictionary_path,
        link_count: links.len(),
        unique_urls,
    })
}
