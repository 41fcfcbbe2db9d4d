//! Encoding of the record collection.
//!
//! Snapshots are the bridge between the in-memory collection and persistent
//! storage. The persisted form and the export document are the same JSON
//! array, so an export is byte-for-byte what `save` writes.
//!
//! Imports are more forgiving: any JSON array of objects is accepted and each
//! element is normalized into a fresh, unsynced record.

use crate::{error::Result, record::non_empty, Error, Record, RecordId, Timestamp};
use serde::Deserialize;
use serde_json::Value;

/// Category given to imported quotes that carry none.
pub const DEFAULT_CATEGORY: &str = "general";

/// Encode a collection in its persisted form.
pub fn encode(records: &[Record]) -> Result<String> {
    serde_json::to_string(records).map_err(|e| Error::Encoding(e.to_string()))
}

/// Decode a persisted collection.
pub fn decode(json: &str) -> Result<Vec<Record>> {
    serde_json::from_str(json).map_err(|e| Error::MalformedPersistedData(e.to_string()))
}

/// Loose shape of one imported element.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedQuote {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

/// Parse an import document into records ready to be appended.
///
/// The document must be a JSON array of objects, and every element must
/// carry a non-empty `text` (or `title`). One bad element rejects the whole
/// document. Imported records are never synced, whatever the input says.
pub fn parse_import(json: &str, now: Timestamp) -> Result<Vec<Record>> {
    let items: Vec<Value> =
        serde_json::from_str(json).map_err(|e| Error::MalformedImport(e.to_string()))?;

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            import_element(item, now).map_err(|reason| {
                Error::MalformedImport(format!("element {}: {}", position, reason))
            })
        })
        .collect()
}

fn import_element(item: Value, now: Timestamp) -> std::result::Result<Record, String> {
    // Derived struct impls also accept arrays as positional fields
    if !item.is_object() {
        return Err("expected an object".to_string());
    }
    let quote = ImportedQuote::deserialize(item).map_err(|e| e.to_string())?;
    normalize(quote, now).map_err(|e| e.to_string())
}

fn normalize(item: ImportedQuote, now: Timestamp) -> Result<Record> {
    let text = scalar(item.text)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| scalar(item.title))
        .unwrap_or_default();
    let text = non_empty("text", &text)?;

    let category = scalar(item.category)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let id = scalar(item.id)
        .filter(|id| !id.is_empty())
        .map(RecordId::from)
        .unwrap_or_else(RecordId::new_local);

    let updated_at = item
        .updated_at
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&chrono::Utc))
        .unwrap_or(now);

    let mut record = Record::new_remote(id, text, category, updated_at);
    record.synced = false;
    Ok(record)
}

/// Strings pass through, numbers are stringified, anything else is absent.
fn scalar(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
