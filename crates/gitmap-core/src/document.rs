//! The map document model.
//!
//! A document is a JSON object with two identifiable collections,
//! `operationalLayers` and `tables`, whose entries are keyed by their `id`.
//! Every other top-level key is an opaque property.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A versioned map document (always a JSON object).
pub type Document = Map<String, Value>;

pub const OPERATIONAL_LAYERS: &str = "operationalLayers";
pub const TABLES: &str = "tables";

/// Title reported for entries that carry none.
pub const UNTITLED: &str = "Untitled";

/// The two id-keyed collections of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "operationalLayers")]
    OperationalLayers,
    #[serde(rename = "tables")]
    Tables,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::OperationalLayers, Collection::Tables];

    /// The document key holding this collection.
    pub fn key(self) -> &'static str {
        match self {
            Collection::OperationalLayers => OPERATIONAL_LAYERS,
            Collection::Tables => TABLES,
        }
    }
}

/// Entries of a collection; empty when the key is absent or not an array.
pub fn entries(doc: &Document, collection: Collection) -> &[Value] {
    doc.get(collection.key())
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Replace a collection. With nothing to put in it, an absent key stays absent
/// and a non-array value is left as it was.
pub fn set_entries(doc: &mut Document, collection: Collection, list: Vec<Value>) {
    let holds_array = doc.get(collection.key()).is_some_and(Value::is_array);
    if list.is_empty() && !holds_array {
        return;
    }
    doc.insert(collection.key().to_string(), Value::Array(list));
}

/// The identity of an entry: a non-empty string id, or a numeric id rendered as text.
pub fn entry_id(entry: &Value) -> Option<String> {
    match entry.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn entry_title(entry: &Value) -> String {
    entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(UNTITLED)
        .to_string()
}

/// An empty object (or null) stands for "deleted" in conflicts and resolutions.
pub fn is_deletion(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Every top-level key except the two collections.
pub fn properties(doc: &Document) -> Document {
    doc.iter()
        .filter(|(k, _)| k.as_str() != OPERATIONAL_LAYERS && k.as_str() != TABLES)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Id -> entry lookup over one collection.
///
/// Entries without an id are skipped. When an id repeats, the last entry wins
/// but the id keeps its first position in [`EntryIndex::ids`].
#[derive(Debug, Default)]
pub struct EntryIndex<'a> {
    order: Vec<String>,
    by_id: HashMap<String, &'a Value>,
}

impl<'a> EntryIndex<'a> {
    pub fn new(list: &'a [Value]) -> Self {
        let mut index = Self::default();
        for entry in list {
            let Some(id) = entry_id(entry) else { continue };
            if index.by_id.insert(id.clone(), entry).is_none() {
                index.order.push(id);
            }
        }
        index
    }

    pub fn of(doc: &'a Document, collection: Collection) -> Self {
        Self::new(entries(doc, collection))
    }

    pub fn get(&self, id: &str) -> Option<&'a Value> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Ids in first-seen order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
