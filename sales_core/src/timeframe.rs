use crate::{Result, SalesError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

/// Layout of `created_date` in marketplace events: zone-less ISO-8601 with
/// optional fractional seconds, interpreted as UTC
pub const CREATED_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse an event `created_date` into a UTC timestamp
pub fn parse_created_date(created_date: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(created_date.trim(), CREATED_DATE_FORMAT)
        .map_err(|e| {
            SalesError::TimestampParse(format!("Invalid created_date '{}': {}", created_date, e))
        })?;

    let parsed = Utc.from_utc_datetime(&naive);
    debug!(
        "created_date {} => {} (UTC seconds since epoch)",
        created_date,
        parsed.timestamp()
    );
    Ok(parsed)
}

/// Epoch seconds for an event `created_date`
pub fn created_date_to_epoch(created_date: &str) -> Result<i64> {
    parse_created_date(created_date).map(|dt| dt.timestamp())
}
