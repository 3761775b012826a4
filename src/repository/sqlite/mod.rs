pub mod credentials_repository;
pub mod issue_repository;
pub mod job_repository;

use chrono::{DateTime, Utc};

/// Shared datetime-parsing helper: RFC3339 strings round-tripped through
/// sqlite TEXT columns, falling back to "now" rather than panicking on a
/// malformed stored value.
pub fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub fn parse_datetime_opt(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
