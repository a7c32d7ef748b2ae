//! Delimited-file tables.
//!
//! Every stage reads one or more flat files into an in-memory [`Table`], works
//! on it, and writes the result back out in one go. Fields are kept as strings
//! so unknown columns survive a round trip untouched; writing uses
//! `QuoteStyle::NonNumeric` so numeric columns stay unquoted.

mod values;

pub use values::{
    format_bool, format_number, parse_flag, parse_timestamp, parse_timestamp_utc, NumericSum,
};

use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, trace};

use crate::error::PipelineError;

/// An ordered, header-addressed table of string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Reads a whole file. All rows must have as many fields as the header.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        debug!("Reading table from {}", path.display());
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("Failed to read row {} of {}", line + 1, path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(Self { headers, rows })
    }

    /// Writes header and rows, replacing any existing file
    pub fn write(&self, path: &Path, delimiter: u8) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::NonNumeric)
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        debug!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Appends rows to `path`, writing the header first when `truncate` is set
    pub fn append(&self, path: &Path, delimiter: u8, truncate: bool) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::NonNumeric)
            .from_writer(file);
        if truncate {
            writer.write_record(&self.headers)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        trace!("Appended {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<String>] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Resolves every column in `names` or fails with [`PipelineError::MissingColumns`]
    pub fn require_columns(&self, path: &Path, names: &[&str]) -> Result<Vec<usize>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingColumns {
                path: path.to_path_buf(),
                missing,
            }
            .into());
        }
        Ok(names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect())
    }

    /// Returns the index of `name`, appending it filled with `default` if absent
    pub fn ensure_column(&mut self, name: &str, default: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
        self.headers.len() - 1
    }

    /// Adds a row; it must have one cell per header
    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    /// Copy of the table restricted to `columns`, in the given order
    pub fn project(&self, path: &Path, columns: &[&str]) -> Result<Table> {
        let indices = self.require_columns(path, columns)?;
        let mut out = Table::new(columns.iter().copied());
        for row in &self.rows {
            out.push_row(indices.iter().map(|&i| row[i].clone()).collect());
        }
        Ok(out)
    }

    /// Copy of the table holding only the rows `keep` accepts
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[String]) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Columns (other than `exclude`) where every non-empty cell is a number
    pub fn numeric_columns(&self, exclude: &[&str]) -> Vec<usize> {
        (0..self.headers.len())
            .filter(|&col| !exclude.contains(&self.headers[col].as_str()))
            .filter(|&col| {
                let mut seen = false;
                let all_numeric = self.rows.iter().all(|row| {
                    let cell = row[col].trim();
                    if cell.is_empty() {
                        return true;
                    }
                    seen = true;
                    cell.parse::<f64>().is_ok()
                });
                seen && all_numeric
            })
            .collect()
    }

    /// Groups rows by `key` (sorted) and sums every numeric column
    pub fn group_sum(&self, key: &str) -> Option<Table> {
        let key_idx = self.column_index(key)?;
        let numeric = self.numeric_columns(&[key]);

        let mut groups: BTreeMap<&str, Vec<NumericSum>> = BTreeMap::new();
        for row in &self.rows {
            let sums = groups
                .entry(row[key_idx].as_str())
                .or_insert_with(|| vec![NumericSum::default(); numeric.len()]);
            for (sum, &col) in sums.iter_mut().zip(&numeric) {
                sum.add(&row[col]);
            }
        }

        let mut headers = vec![key.to_string()];
        headers.extend(numeric.iter().map(|&c| self.headers[c].clone()));
        let mut out = Table::new(headers);
        for (group, sums) in groups {
            let mut row = vec![group.to_string()];
            row.extend(sums.iter().map(NumericSum::render));
            out.push_row(row);
        }
        Some(out)
    }
}
