use boxes_core::time::parse_timestamp;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Parse a stored timestamp column, returning CorruptRow on failure.
pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(raw).ok_or_else(|| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid timestamp: {raw}"),
    })
}

/// Convert a SQLite count to `u64`, rejecting negatives.
pub fn count(raw: i64, table: &'static str) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::CorruptRow {
        table,
        column: "COUNT(*)",
        detail: format!("negative count {raw}"),
    })
}
