use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{RegistryError, RegistryResult};

/// Timestamps are stored as RFC 3339 in UTC.
pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_time(s: &str) -> RegistryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RegistryError::InvalidState(format!("bad timestamp \"{s}\": {e}")))
}

pub fn timestamp() -> String {
    format_time(&Utc::now())
}
