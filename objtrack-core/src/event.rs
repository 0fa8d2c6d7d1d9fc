//! Storage notification batches and record extraction.
//!
//! The provider's wire format is kept close to the bytes: each record stays a
//! raw `serde_json::Value` until it is extracted, so one malformed entry is
//! reported on its own instead of failing the whole batch.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{IngestError, Result};

pub const BUCKET_FIELD: &str = "s3.bucket.name";
pub const KEY_FIELD: &str = "s3.object.key";

/// One invocation's input, in arrival order.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", alias = "records")]
    records: Vec<Value>,
}

/// Identifiers pulled out of a single notification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Position within the batch
    pub index: usize,
    pub bucket: String,
    /// Opaque, exactly as delivered (never URL-decoded)
    pub key: String,
    /// e.g. `ObjectCreated:Put`, diagnostics only
    pub event_name: Option<String>,
    /// When the provider saw the event. Unparseable timestamps are dropped.
    pub event_time: Option<DateTime<Utc>>,
}

impl NotificationBatch {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Decode a batch from an invocation payload.
    ///
    /// Only a structurally absent batch fails here: a payload that is not
    /// an object, or one without a `Records` array.
    pub fn from_value(payload: Value) -> Result<Self> {
        let Value::Object(mut map) = payload else {
            return Err(IngestError::invalid_batch("payload is not a JSON object"));
        };
        let records = map
            .remove("Records")
            .or_else(|| map.remove("records"))
            .ok_or_else(|| IngestError::invalid_batch("missing 'Records' array"))?;
        match records {
            Value::Array(records) => Ok(Self { records }),
            other => Err(IngestError::invalid_batch(format!(
                "'Records' must be an array, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| IngestError::invalid_batch(format!("invalid JSON: {}", e)))?;
        Self::from_value(payload)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lazily extract `(bucket, key)` pairs, one item per record in input
    /// order. The batch is only borrowed, so calling this again yields the
    /// same sequence.
    pub fn records(&self) -> Records<'_> {
        Records {
            inner: self.records.iter().enumerate(),
        }
    }
}

/// Iterator returned by [`NotificationBatch::records`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    inner: std::iter::Enumerate<std::slice::Iter<'a, Value>>,
}

impl Iterator for Records<'_> {
    type Item = Result<ObjectRef>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(index, record)| extract_record(index, record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Records<'_> {}

/// Pull bucket and key out of one record.
///
/// Accepts the provider's `s3.*` layout and the generic `storage.*` one.
/// Absent, non-string and empty values all count as missing.
pub fn extract_record(index: usize, record: &Value) -> Result<ObjectRef> {
    let bucket = lookup_str(record, &["/s3/bucket/name", "/storage/bucket/name"])
        .ok_or_else(|| IngestError::malformed(index, BUCKET_FIELD))?;
    let key = lookup_str(record, &["/s3/object/key", "/storage/object/key"])
        .ok_or_else(|| IngestError::malformed(index, KEY_FIELD))?;
    let event_name = record
        .get("eventName")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let event_time = record
        .get("eventTime")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|time| time.with_timezone(&Utc));

    Ok(ObjectRef {
        index,
        bucket: bucket.to_owned(),
        key: key.to_owned(),
        event_name,
        event_time,
    })
}

fn lookup_str<'a>(record: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|pointer| record.pointer(pointer).and_then(Value::as_str))
        .filter(|value| !value.is_empty())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
