//! Time utility functions

use chrono::{DateTime, NaiveDateTime, Utc};

/// Naive ISO 8601 layouts accepted when no offset is present (treated as UTC)
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO 8601 / RFC 3339 timestamp string to DateTime<Utc>
///
/// Accepts offset-qualified timestamps (`2024-01-01T10:00:00+02:00`, `...Z`)
/// as well as naive ones (`2024-01-01T10:00:00.123456`), which are read as UTC.
pub fn parse_iso_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse an optional timestamp, falling back to the current time
///
/// Unparseable input is logged and replaced with now.
pub fn timestamp_or_now(ts: Option<&str>) -> DateTime<Utc> {
    match ts {
        Some(raw) => parse_iso_timestamp(raw).unwrap_or_else(|| {
            tracing::warn!(ts = raw, "Invalid ISO timestamp, using current time");
            Utc::now()
        }),
        None => Utc::now(),
    }
}

/// Fractional milliseconds elapsed between two instants (negative if `end`
/// precedes `start`), at microsecond precision
pub fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let elapsed = end - start;
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1_000.0,
        None => elapsed.num_milliseconds() as f64,
    }
}
