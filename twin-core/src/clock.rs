//! Time source for status and metadata timestamps.

use chrono::{DateTime, TimeZone, Utc};

/// Function returning the current UTC time. Tests pass a fixed one.
pub type Clock = fn() -> DateTime<Utc>;

/// Wire format for every timestamp the core writes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// The default clock.
pub fn system_clock() -> DateTime<Utc> {
    Utc::now()
}

/// Clock pinned to the Unix epoch.
pub fn epoch_clock() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
