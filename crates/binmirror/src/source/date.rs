//! Timestamp and size normalization shared by every adapter.
//!
//! Upstreams publish dates in whatever format their web server or API uses.
//! Everything is normalized to RFC 3339 in UTC with millisecond precision
//! (`2021-12-17T20:10:00.000Z`) so that unchanged upstream entries compare
//! equal across runs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Naive layouts seen in directory indexes, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%d-%b-%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Date-only layouts; midnight UTC is assumed.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y"];

/// Format a UTC instant the way nodes store it.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize an upstream date string. Returns `None` when nothing matches.
///
/// Naive timestamps (no zone) are taken as UTC.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_upstream(raw).map(format_date)
}

/// Like [`normalize_date`], falling back to an empty string.
pub fn normalize_or_empty(raw: &str) -> String {
    normalize_date(raw).unwrap_or_default()
}

fn parse_upstream(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a date previously produced by [`format_date`].
pub fn parse_normalized(date: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a size column from a directory index.
///
/// `-` and empty mean unknown. Human-readable suffixes (`K`, `M`, `G`, `T`,
/// optionally followed by `B`) are multiplied by powers of 1024.
pub fn parse_size(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    if let Ok(bytes) = raw.parse::<i64>() {
        return Some(bytes);
    }

    let upper = raw.to_ascii_uppercase();
    let number = upper.trim_end_matches(['B', 'I']);
    let (digits, multiplier) = match number.chars().last()? {
        'K' => (&number[..number.len() - 1], 1024_f64),
        'M' => (&number[..number.len() - 1], 1024_f64.powi(2)),
        'G' => (&number[..number.len() - 1], 1024_f64.powi(3)),
        'T' => (&number[..number.len() - 1], 1024_f64.powi(4)),
        _ => (number, 1_f64),
    };
    let value: f64 = digits.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as i64)
}
