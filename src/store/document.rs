//! Generic document shape shared by every backend.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::StoreError;

pub type Document = Map<String, Value>;

/// Serialize a typed record into a store document.
///
/// # Errors
///
/// Returns `InvalidDocument` when the value does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

/// Deserialize a store document into a typed record. Store-managed fields are ignored.
///
/// # Errors
///
/// Returns `Serialization` when the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(mut doc: Document) -> Result<T, StoreError> {
    strip_system_fields(&mut doc);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Remove store-managed fields (`_etag`, `_ts`, anything starting with `_`).
pub fn strip_system_fields(doc: &mut Document) {
    doc.retain(|key, _| !key.starts_with('_'));
}

/// The document's `id`, when present and a non-empty string.
#[must_use]
pub fn id_of(doc: &Document) -> Option<&str> {
    string_field(doc, "id")
}

#[must_use]
pub fn string_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
