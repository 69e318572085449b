use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Current UTC calendar date.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Calendar date (UTC) of an upstream timestamp. Accepts RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` and a bare `YYYY-MM-DD`.
pub fn parse_upstream_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc).date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(timestamp.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
