use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::PipelineError;

/// Reads a persisted boolean. Only a case-insensitive "true" counts as true.
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Persisted spelling of booleans
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Renders a float without a trailing `.0` when it is integral
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Running sum of a numeric column that stays integral while it can
#[derive(Debug, Clone, Default)]
pub struct NumericSum {
    int_total: i64,
    float_total: f64,
    is_float: bool,
}

impl NumericSum {
    pub fn add(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        if !self.is_float {
            if let Some(total) = raw
                .parse::<i64>()
                .ok()
                .and_then(|value| self.int_total.checked_add(value))
            {
                self.int_total = total;
                return;
            }
            self.is_float = true;
            self.float_total = self.int_total as f64;
        }
        if let Ok(value) = raw.parse::<f64>() {
            self.float_total += value;
        }
    }

    pub fn render(&self) -> String {
        if self.is_float {
            self.float_total.to_string()
        } else {
            self.int_total.to_string()
        }
    }
}

/// Parses the timestamp formats found in corpus exports.
///
/// Accepts RFC 3339, `YYYY-mm-dd HH:MM:SS[.f][±hh:mm]` and a bare `YYYY-mm-dd`.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, PipelineError> {
    let value = raw.trim();
    let utc = || FixedOffset::east_opt(0);

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            if let Some(offset) = utc() {
                return Ok(offset.from_utc_datetime(&naive));
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let (Some(naive), Some(offset)) = (date.and_hms_opt(0, 0, 0), utc()) {
            return Ok(offset.from_utc_datetime(&naive));
        }
    }
    Err(PipelineError::UnparseableTimestamp {
        value: value.to_string(),
    })
}

/// Same instant as `parse_timestamp`, in UTC
pub fn parse_timestamp_utc(raw: &str) -> Result<DateTime<Utc>, PipelineError> {
    parse_timestamp(raw).map(|t| t.with_timezone(&Utc))
}
