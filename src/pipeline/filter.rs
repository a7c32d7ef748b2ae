use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, NaiveDate};
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;
use crate::table::{parse_timestamp, Table};

/// What `filter` keeps of a table
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub date_column: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Converts the date column to this offset before comparing and writing
    pub utc_offset: Option<FixedOffset>,
    /// Columns to keep; entries may hold several comma-separated names
    pub columns: Vec<String>,
}

impl FilterOptions {
    fn filters_dates(&self) -> bool {
        self.from_date.is_some() || self.to_date.is_some() || self.utc_offset.is_some()
    }

    fn column_list(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|c| c.split(','))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// Parses `+09:00`, `-0330`, `Z` or `UTC`
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| PipelineError::InvalidConfig("invalid UTC offset".to_string()).into());
    }
    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => bail!(PipelineError::InvalidConfig(format!(
            "UTC offset {value:?} must start with + or -"
        ))),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!(PipelineError::InvalidConfig(format!(
            "UTC offset {value:?} must look like +HH:MM"
        )));
    }
    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(|| {
        PipelineError::InvalidConfig(format!("UTC offset {value:?} is out of range")).into()
    })
}

/// Applies date filtering (inclusive whole days) and column projection
pub fn filter_table(table: &Table, path: &Path, options: &FilterOptions) -> Result<Table> {
    let mut out = table.clone();

    if options.filters_dates() {
        let col = table.require_columns(path, &[options.date_column.as_str()])?[0];
        let mut kept = Table::new(table.headers().iter().cloned());
        for (line, row) in table.rows().iter().enumerate() {
            let ts = parse_timestamp(&row[col]).with_context(|| {
                format!("Bad timestamp on row {} of {}", line + 1, path.display())
            })?;
            let ts = match options.utc_offset {
                Some(offset) => ts.with_timezone(&offset),
                None => ts,
            };
            let day = ts.date_naive();
            if options.from_date.is_some_and(|from| day < from)
                || options.to_date.is_some_and(|to| day > to)
            {
                continue;
            }
            let mut row = row.clone();
            if options.utc_offset.is_some() {
                row[col] = ts.format("%Y-%m-%d %H:%M:%S%:z").to_string();
            }
            kept.push_row(row);
        }
        out = kept;
    }

    let columns = options.column_list();
    if !columns.is_empty() {
        out = out.project(path, &columns)?;
    }
    Ok(out)
}

pub fn run_filter(
    input: &Path,
    output: &Path,
    options: &FilterOptions,
    delimiter: u8,
) -> Result<usize> {
    println!("Reading csv from {}...", input.display());
    let table = Table::read(input, delimiter)?;
    let filtered = filter_table(&table, input, options)?;
    println!("Finished filtering. Saving into {}...", output.display());
    filtered.write(output, delimiter)?;
    info!("Kept {} of {} rows", filtered.len(), table.len());
    Ok(filtered.len())
}
