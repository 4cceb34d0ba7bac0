//! Timestamp utilities

use chrono::{DateTime, NaiveDateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Interpret a SQLite `CURRENT_TIMESTAMP` value (stored without zone) as UTC
pub fn from_sqlite(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}
