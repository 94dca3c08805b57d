use chrono::{DateTime, NaiveDateTime, Utc};

/// Minute-precision ISO-8601 rendering used in recryption responses
pub const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", MINUTE_FORMAT];

#[derive(Debug, thiserror::Error)]
#[error("invalid expiration date: {0}")]
pub struct ExpirationParseError(String);

/// Render an expiration as `YYYY-MM-DDTHH:MM` in UTC.
pub fn to_minute_iso(expiration: &DateTime<Utc>) -> String {
    expiration.format(MINUTE_FORMAT).to_string()
}

/// Parse an expiration reported by a compute node.
///
/// Accepts RFC 3339 timestamps and offset-less ISO-8601 timestamps, the
/// latter read as UTC.
pub fn parse_expiration(value: &str) -> Result<DateTime<Utc>, ExpirationParseError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ExpirationParseError(value.to_string()))
}
