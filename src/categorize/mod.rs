//! Keyword categorization of a text column.
//!
//! A row belongs to a category when any of the category's keywords occurs in
//! its lowercased text.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Map;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::table::Table;

#[derive(Debug, Deserialize)]
struct CategoriesFile {
    categories: Map<String, serde_json::Value>,
}

/// Categories in file order, keywords trimmed and lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categories {
    entries: Vec<(String, Vec<String>)>,
}

impl Categories {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, keywords)| {
                let keywords = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .collect();
                (name, keywords)
            })
            .collect();
        Self { entries }
    }

    /// Parses `{"categories": {"name": ["keyword", ...]}}`
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CategoriesFile =
            serde_json::from_str(raw).context("Failed to parse categories JSON")?;
        let mut entries = Vec::with_capacity(file.categories.len());
        for (name, value) in file.categories {
            let keywords: Vec<String> = serde_json::from_value(value)
                .with_context(|| format!("Keywords of category {name:?} must be a list of strings"))?;
            entries.push((name, keywords));
        }
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read categories file {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

/// Keyword hit counts in first-seen order
#[derive(Debug, Default)]
struct Frequencies {
    counts: Vec<(String, usize)>,
    seen: HashSet<String>,
}

impl Frequencies {
    fn register(&mut self, keyword: &str) {
        if self.seen.insert(keyword.to_string()) {
            self.counts.push((keyword.to_string(), 0));
        }
    }

    fn count_row(&mut self, body: &str) {
        for (keyword, count) in &mut self.counts {
            if body.contains(keyword.as_str()) {
                *count += 1;
            }
        }
    }

    fn into_table(self) -> Table {
        let mut table = Table::new(["keyword", "frequency"]);
        for (keyword, count) in self.counts {
            table.push_row(vec![keyword, count.to_string()]);
        }
        table
    }
}

/// Adds a 0/1 column per category and returns the keyword frequency table.
///
/// A keyword's frequency is the number of rows containing it; a keyword listed
/// under several categories is still counted once per row.
pub fn categorize(
    table: &mut Table,
    path: &Path,
    text_column: &str,
    categories: &Categories,
) -> Result<Table> {
    let text = table.require_columns(path, &[text_column])?[0];
    let lowered: Vec<String> = table.rows().iter().map(|r| r[text].to_lowercase()).collect();

    let mut frequencies = Frequencies::default();
    for (_, keywords) in &categories.entries {
        for keyword in keywords {
            frequencies.register(keyword);
        }
    }
    for body in &lowered {
        frequencies.count_row(body);
    }

    for (name, keywords) in &categories.entries {
        let col = table.ensure_column(name, "0");
        let mut members = 0;
        for (row, body) in table.rows_mut().iter_mut().zip(&lowered) {
            let belongs = keywords.iter().any(|k| body.contains(k.as_str()));
            row[col] = if belongs { "1" } else { "0" }.to_string();
            members += usize::from(belongs);
        }
        debug!("Category {} matched {} rows", name, members);
    }
    Ok(frequencies.into_table())
}

pub fn run_categorize(
    categories_path: &Path,
    input: &Path,
    output: &Path,
    frequencies_output: &Path,
    text_column: &str,
    delimiter: u8,
) -> Result<()> {
    let categories = Categories::load(categories_path)?;
    let mut table = Table::read(input, delimiter)?;

    println!("Categorizing...");
    let frequencies = categorize(&mut table, input, text_column, &categories)?;
    table.write(output, delimiter)?;
    frequencies.write(frequencies_output, delimiter)?;
    info!(
        "Categorized {} rows into {} categories",
        table.len(),
        categories.entries.len()
    );
    println!("Done!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: &str = r#"{
        "categories": {
            "weather": [" Rain ", "SNOW"],
            "sport": ["football", "rain"]
        }
    }"#;

    fn sample() -> Table {
        let mut t = Table::new(["id", "text"]);
        for (id, text) in [
            ("1", "Heavy RAIN today"),
            ("2", "Football match cancelled"),
            ("3", "Sunny"),
        ] {
            t.push_row(vec![id.into(), text.into()]);
        }
        t
    }

    #[test]
    fn test_from_json_keeps_order_and_cleans_keywords() {
        let categories = Categories::from_json(CATEGORIES).unwrap();
        assert_eq!(categories.names().collect::<Vec<_>>(), vec!["weather", "sport"]);
        assert_eq!(categories.entries[0].1, vec!["rain", "snow"]);
    }

    #[test]
    fn test_bad_json_rejected() {
        assert!(Categories::from_json(r#"{"categories": {"a": "rain"}}"#).is_err());
        assert!(Categories::from_json(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn test_categorize_rows() {
        let categories = Categories::from_json(CATEGORIES).unwrap();
        let mut table = sample();
        let freq = categorize(&mut table, Path::new("in.csv"), "text", &categories).unwrap();

        assert_eq!(table.headers(), ["id", "text", "weather", "sport"]);
        assert_eq!(table.rows()[0][2..], ["1", "1"]);
        assert_eq!(table.rows()[1][2..], ["0", "1"]);
        assert_eq!(table.rows()[2][2..], ["0", "0"]);

        let freq: Vec<(&str, &str)> = freq
            .rows()
            .iter()
            .map(|r| (r[0].as_str(), r[1].as_str()))
            .collect();
        assert_eq!(freq, vec![("rain", "1"), ("snow", "0"), ("football", "1")]);
    }

    #[test]
    fn test_missing_text_column() {
        let categories = Categories::from_json(CATEGORIES).unwrap();
        let mut table = sample();
        assert!(categorize(&mut table, Path::new("in.csv"), "body", &categories).is_err());
    }
}
