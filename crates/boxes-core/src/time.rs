//! Timestamp helpers shared by the store and the filter engine.
//!
//! Stored timestamps always use the fixed `YYYY-MM-DDTHH:MM:SS.ffffffZ` form,
//! so string comparison inside SQLite orders them chronologically.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Render a timestamp in the canonical storage format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously written by [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a user-supplied timestamp.
///
/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date
/// (midnight UTC).
pub fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts);
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Start of the weekly quota window: `now` minus the weekday offset in days
/// (Monday = 0). The time of day is kept as-is.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(now.weekday().num_days_from_monday()))
}
