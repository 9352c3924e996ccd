//! Encoding of domain entities to the JSON files shared with other
//! writers: the snapshot cache, the cloud copy and the bridge files.

mod entities;
mod path;
pub mod records;
mod snapshot;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, SyncError};

pub use entities::{
    decode_activity, decode_project, decode_sprint, decode_task, decode_team_member,
    encode_activity, encode_project, encode_sprint, encode_task, encode_team_member,
};
pub use path::PathCodec;
pub use snapshot::{
    decode_project_patch, decode_snapshot, decode_task_list, encode_project_file,
    encode_snapshot, encode_task_list,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Pretty JSON with object keys in sorted order.
///
/// Going through `serde_json::Value` sorts every nested object, so equal
/// data always produces identical bytes.
pub fn to_sorted_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SyncError::decode(format!("{}: invalid timestamp '{}': {}", field, value, e)))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| SyncError::decode(format!("{}: invalid date '{}': {}", field, value, e)))
}

pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| SyncError::decode(format!("{}: invalid id '{}': {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sorted_json_orders_keys() {
        #[derive(Serialize)]
        struct Unsorted {
            zebra: u8,
            apple: u8,
            mango: u8,
        }

        let bytes = to_sorted_json(&Unsorted { zebra: 1, apple: 2, mango: 3 }).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let apple = text.find("apple").unwrap();
        let mango = text.find("mango").unwrap();
        let zebra = text.find("zebra").unwrap();
        assert!(apple < mango && mango < zebra);
    }

    #[test]
    fn test_timestamp_keeps_subsecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let text = format_timestamp(&ts);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp("t", &text).unwrap(), ts);
    }

    #[test]
    fn test_parse_errors_are_decode_errors() {
        assert!(matches!(parse_uuid("id", "nope"), Err(SyncError::Decode(_))));
        assert!(matches!(parse_date("d", "2024-13-01"), Err(SyncError::Decode(_))));
        assert!(matches!(parse_timestamp("t", "yesterday"), Err(SyncError::Decode(_))));
    }
}
