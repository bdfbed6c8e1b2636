//! Parsing utilities for absolute timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Naive formats accepted when no offset is given. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO 8601 timestamp string into epoch milliseconds.
///
/// Accepts `"2026-01-12T18:00:00Z"`, an explicit offset, or a naive
/// `"2026-01-12T18:00:00"` which is taken as UTC.
pub fn parse_absolute_time_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    let ms = match input.parse::<DateTime<Utc>>() {
        Ok(dt) => dt.timestamp_millis(),
        Err(e) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .map(|naive| naive.and_utc().timestamp_millis())
            .ok_or_else(|| Error::invalid_trigger(format!("invalid ISO 8601 timestamp: {e}")))?,
    };

    if ms < 0 {
        return Err(Error::invalid_trigger("timestamp is before epoch"));
    }
    Ok(ms as u64)
}

/// Render epoch milliseconds as RFC 3339 in UTC.
#[must_use]
pub fn format_ms(ms: u64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
