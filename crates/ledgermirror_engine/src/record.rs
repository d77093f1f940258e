//! Records and response body decoding.

use crate::error::{SyncError, SyncResult};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// An opaque remote record with a stable identity.
///
/// The engine never edits record fields; the identity is extracted once at
/// decode time and used as the merge key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    value: Value,
}

impl Record {
    /// Wraps a JSON object, reading its identity from `identity_field`.
    ///
    /// Returns `None` if the value is not an object or the identity is
    /// missing, empty or not a string.
    pub fn from_value(value: Value, identity_field: &str) -> Option<Self> {
        let id = value
            .as_object()?
            .get(identity_field)?
            .as_str()
            .filter(|id| !id.is_empty())?
            .to_string();
        Some(Self { id, value })
    }

    /// Returns the identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the underlying JSON value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns a string field, if present.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(Value::as_str)
    }

    /// Returns a field of any type, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    /// Consumes the record, returning the JSON value.
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

/// Extracts the item array from a response body.
///
/// The API answers either with a bare array or with a paginated object
/// carrying a `Collection` array.
pub fn collection_items(body: Value) -> SyncResult<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("Collection") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Err(SyncError::Decode(
                "response object has no Collection array".into(),
            )),
            Some(other) => Err(SyncError::Decode(format!(
                "Collection is not an array: {}",
                type_name(&other)
            ))),
        },
        other => Err(SyncError::Decode(format!(
            "expected array or paginated object, got {}",
            type_name(&other)
        ))),
    }
}

/// Decodes a response body into records keyed by `identity_field`.
///
/// Items without a usable identity are skipped with a warning.
pub fn records_from_body(body: Value, identity_field: &str) -> SyncResult<Vec<Record>> {
    let items = collection_items(body)?;
    Ok(records_from_items(items, identity_field))
}

/// Wraps already extracted items as records, skipping those without identity.
pub fn records_from_items(items: Vec<Value>, identity_field: &str) -> Vec<Record> {
    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| Record::from_value(item, identity_field))
        .collect();

    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            field = identity_field,
            "Skipping records without identity"
        );
    }
    records
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
