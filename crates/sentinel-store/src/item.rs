//! AttributeValue marshalling helpers.
//!
//! Wall-clock attributes (`created_at`, `updated_at`, ...) are RFC3339
//! strings truncated to whole seconds so lexicographic range queries on a
//! GSI sort chronologically. The TTL attribute (`expires_at`) is a number
//! of epoch seconds, which is what DynamoDB's TTL sweeper reads.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use jiff::Timestamp;

use crate::error::StoreError;

pub(crate) type Item = HashMap<String, AttributeValue>;

pub(crate) fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub(crate) fn n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

/// RFC3339 at whole-second precision, sortable as a string.
pub(crate) fn ts_s(ts: Timestamp) -> AttributeValue {
    s(fmt_ts(ts))
}

/// Epoch seconds, for the TTL attribute.
pub(crate) fn ts_epoch(ts: Timestamp) -> AttributeValue {
    n(ts.as_second())
}

pub(crate) fn fmt_ts(ts: Timestamp) -> String {
    Timestamp::from_second(ts.as_second())
        .unwrap_or(ts)
        .to_string()
}

pub(crate) fn get_s(item: &Item, field: &'static str, id: &str) -> Result<String, StoreError> {
    item.get(field)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| malformed(id, field))
}

pub(crate) fn get_opt_s(item: &Item, field: &'static str) -> Option<String> {
    item.get(field).and_then(|v| v.as_s().ok()).cloned()
}

pub(crate) fn get_n(item: &Item, field: &'static str, id: &str) -> Result<i64, StoreError> {
    item.get(field)
        .and_then(|v| v.as_n().ok())
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| malformed(id, field))
}

/// Read an RFC3339 string attribute back into a timestamp.
pub(crate) fn get_ts(item: &Item, field: &'static str, id: &str) -> Result<Timestamp, StoreError> {
    get_s(item, field, id)?
        .parse()
        .map_err(|_| malformed(id, field))
}

/// Read an epoch-seconds number attribute back into a timestamp.
pub(crate) fn get_ts_epoch(
    item: &Item,
    field: &'static str,
    id: &str,
) -> Result<Timestamp, StoreError> {
    Timestamp::from_second(get_n(item, field, id)?).map_err(|_| malformed(id, field))
}

fn malformed(id: &str, field: &'static str) -> StoreError {
    StoreError::Malformed {
        id: id.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_at_second_precision() {
        let ts: Timestamp = "2026-01-20T12:34:56.789Z".parse().unwrap();
        let mut item = Item::new();
        item.insert("created_at".to_string(), ts_s(ts));
        item.insert("expires_at".to_string(), ts_epoch(ts));

        let s_back = get_ts(&item, "created_at", "x").unwrap();
        let n_back = get_ts_epoch(&item, "expires_at", "x").unwrap();
        assert_eq!(s_back.as_second(), ts.as_second());
        assert_eq!(n_back.as_second(), ts.as_second());
    }

    #[test]
    fn second_precision_strings_sort_chronologically() {
        let a: Timestamp = "2026-01-20T12:00:00.900Z".parse().unwrap();
        let b: Timestamp = "2026-01-20T12:00:01.100Z".parse().unwrap();
        assert!(fmt_ts(a) < fmt_ts(b));
    }

    #[test]
    fn missing_and_mistyped_fields_are_malformed() {
        let mut item = Item::new();
        item.insert("count".to_string(), s("not-a-number"));

        assert!(matches!(
            get_s(&item, "absent", "id1"),
            Err(StoreError::Malformed { .. })
        ));
        assert!(matches!(
            get_n(&item, "count", "id1"),
            Err(StoreError::Malformed { .. })
        ));
    }
}
