//! Structural diff between two document snapshots.
//!
//! Layers and tables are compared by id; everything else goes through a
//! generic deep diff whose buckets follow the familiar
//! `values_changed` / `dictionary_item_added` / `dictionary_item_removed` shape.

use crate::document::{entry_title, properties, Collection, Document, EntryIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeChange {
    pub old_type: String,
    pub new_type: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Generic deep diff keyed by path (`root['key'][0]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDiff {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values_changed: BTreeMap<String, ValueChange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_changes: BTreeMap<String, TypeChange>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dictionary_item_added: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dictionary_item_removed: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub iterable_item_added: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub iterable_item_removed: BTreeMap<String, Value>,
}

impl JsonDiff {
    pub fn is_empty(&self) -> bool {
        self.values_changed.is_empty()
            && self.type_changes.is_empty()
            && self.dictionary_item_added.is_empty()
            && self.dictionary_item_removed.is_empty()
            && self.iterable_item_added.is_empty()
            && self.iterable_item_removed.is_empty()
    }
}

/// One changed layer or table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerChange {
    pub id: String,
    pub title: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "JsonDiff::is_empty")]
    pub details: JsonDiff,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDiff {
    pub layer_changes: Vec<LayerChange>,
    pub table_changes: Vec<LayerChange>,
    pub property_changes: JsonDiff,
}

impl MapDiff {
    pub fn has_changes(&self) -> bool {
        !self.layer_changes.is_empty()
            || !self.table_changes.is_empty()
            || !self.property_changes.is_empty()
    }

    pub fn changes(&self, collection: Collection) -> &[LayerChange] {
        match collection {
            Collection::OperationalLayers => &self.layer_changes,
            Collection::Tables => &self.table_changes,
        }
    }

    /// Changes of one kind within a collection, e.g. all added tables.
    pub fn filtered(
        &self,
        collection: Collection,
        change_type: ChangeType,
    ) -> impl Iterator<Item = &LayerChange> {
        self.changes(collection)
            .iter()
            .filter(move |c| c.change_type == change_type)
    }
}

/// Diff `current` against `previous` (typically index vs. committed snapshot).
pub fn diff_maps(current: &Document, previous: &Document) -> MapDiff {
    let current_props = Value::Object(properties(current));
    let previous_props = Value::Object(properties(previous));

    MapDiff {
        layer_changes: diff_collection(current, previous, Collection::OperationalLayers),
        table_changes: diff_collection(current, previous, Collection::Tables),
        property_changes: diff_json(&current_props, &previous_props, true),
    }
}

fn diff_collection(current: &Document, previous: &Document, collection: Collection) -> Vec<LayerChange> {
    diff_entries(
        crate::document::entries(current, collection),
        crate::document::entries(previous, collection),
    )
}

/// Compare two entry lists by id: added, removed, then modified.
pub fn diff_entries(current: &[Value], previous: &[Value]) -> Vec<LayerChange> {
    let now = EntryIndex::new(current);
    let before = EntryIndex::new(previous);
    let mut changes = Vec::new();

    for id in now.ids() {
        if !before.contains(id) {
            let entry = now.get(id).unwrap_or(&Value::Null);
            changes.push(LayerChange {
                id: id.clone(),
                title: entry_title(entry),
                change_type: ChangeType::Added,
                details: JsonDiff::default(),
            });
        }
    }

    for id in before.ids() {
        if !now.contains(id) {
            let entry = before.get(id).unwrap_or(&Value::Null);
            changes.push(LayerChange {
                id: id.clone(),
                title: entry_title(entry),
                change_type: ChangeType::Removed,
                details: JsonDiff::default(),
            });
        }
    }

    for id in now.ids() {
        let (Some(new), Some(old)) = (now.get(id), before.get(id)) else {
            continue;
        };
        if new != old {
            changes.push(LayerChange {
                id: id.clone(),
                title: entry_title(new),
                change_type: ChangeType::Modified,
                details: diff_json(new, old, true),
            });
        }
    }

    changes
}

/// Deep diff of two arbitrary JSON values, `current` against `previous`.
///
/// With `ignore_order`, arrays are compared as multisets: unmatched items are
/// reported as added/removed at their position in their own array.
pub fn diff_json(current: &Value, previous: &Value, ignore_order: bool) -> JsonDiff {
    let mut out = JsonDiff::default();
    walk("root", current, previous, ignore_order, &mut out);
    out
}

fn walk(path: &str, new: &Value, old: &Value, ignore_order: bool, out: &mut JsonDiff) {
    if new == old {
        return;
    }
    match (new, old) {
        (Value::Object(n), Value::Object(o)) => {
            for (key, value) in n {
                let child = format!("{path}['{key}']");
                match o.get(key) {
                    Some(prev) => walk(&child, value, prev, ignore_order, out),
                    None => {
                        out.dictionary_item_added.insert(child);
                    }
                }
            }
            for key in o.keys() {
                if !n.contains_key(key) {
                    out.dictionary_item_removed.insert(format!("{path}['{key}']"));
                }
            }
        }
        (Value::Array(n), Value::Array(o)) if ignore_order => {
            let mut matched = vec![false; o.len()];
            for (i, item) in n.iter().enumerate() {
                let hit = o
                    .iter()
                    .enumerate()
                    .position(|(j, prev)| !matched[j] && prev == item);
                match hit {
                    Some(j) => matched[j] = true,
                    None => {
                        out.iterable_item_added.insert(format!("{path}[{i}]"), item.clone());
                    }
                }
            }
            for (j, prev) in o.iter().enumerate() {
                if !matched[j] {
                    out.iterable_item_removed.insert(format!("{path}[{j}]"), prev.clone());
                }
            }
        }
        (Value::Array(n), Value::Array(o)) => {
            for (i, item) in n.iter().enumerate() {
                let child = format!("{path}[{i}]");
                match o.get(i) {
                    Some(prev) => walk(&child, item, prev, ignore_order, out),
                    None => {
                        out.iterable_item_added.insert(child, item.clone());
                    }
                }
            }
            for (j, prev) in o.iter().enumerate().skip(n.len()) {
                out.iterable_item_removed.insert(format!("{path}[{j}]"), prev.clone());
            }
        }
        _ if type_name(new) == type_name(old) => {
            out.values_changed.insert(
                path.to_string(),
                ValueChange {
                    old_value: old.clone(),
                    new_value: new.clone(),
                },
            );
        }
        _ => {
            out.type_changes.insert(
                path.to_string(),
                TypeChange {
                    old_type: type_name(old).to_string(),
                    new_type: type_name(new).to_string(),
                    old_value: old.clone(),
                    new_value: new.clone(),
                },
            );
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identical_documents_have_no_changes() {
        let d = doc(json!({
            "operationalLayers": [{"id": "l1", "title": "Roads"}],
            "tables": [{"id": "t1"}],
            "version": "2.0"
        }));
        assert!(!diff_maps(&d, &d).has_changes());
    }

    #[test]
    fn added_removed_and_modified_layers() {
        let previous = doc(json!({"operationalLayers": [
            {"id": "keep", "title": "Keep"},
            {"id": "gone", "title": "Gone"},
            {"id": "edit", "title": "Before", "opacity": 1}
        ]}));
        let current = doc(json!({"operationalLayers": [
            {"id": "keep", "title": "Keep"},
            {"id": "edit", "title": "After", "opacity": 1},
            {"id": "new", "title": "New"}
        ]}));

        let d = diff_maps(&current, &previous);
        assert!(d.has_changes());
        let kinds: Vec<(&str, ChangeType)> = d
            .layer_changes
            .iter()
            .map(|c| (c.id.as_str(), c.change_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("new", ChangeType::Added),
                ("gone", ChangeType::Removed),
                ("edit", ChangeType::Modified),
            ]
        );

        let edit = &d.layer_changes[2];
        assert_eq!(edit.title, "After");
        let change = &edit.details.values_changed["root['title']"];
        assert_eq!(change.old_value, json!("Before"));
        assert_eq!(change.new_value, json!("After"));
    }

    #[test]
    fn entries_without_id_are_ignored() {
        let previous = doc(json!({"operationalLayers": [{"title": "anon"}]}));
        let current = doc(json!({"operationalLayers": [{"title": "anon, renamed"}]}));
        assert!(diff_maps(&current, &previous).layer_changes.is_empty());
    }

    #[test]
    fn tables_are_diffed_separately() {
        let previous = doc(json!({"tables": [{"id": "t1", "title": "Owners"}]}));
        let current = doc(json!({"tables": []}));
        let d = diff_maps(&current, &previous);
        assert!(d.layer_changes.is_empty());
        assert_eq!(d.filtered(Collection::Tables, ChangeType::Removed).count(), 1);
        assert_eq!(d.table_changes[0].title, "Owners");
    }

    #[test]
    fn property_changes_cover_other_keys() {
        let previous = doc(json!({"version": "2.0", "baseMap": {"title": "Topo"}, "old": true}));
        let current = doc(json!({"version": "2.1", "baseMap": {"title": "Topo"}, "extra": 1}));
        let d = diff_maps(&current, &previous);
        assert!(d.layer_changes.is_empty());
        let p = &d.property_changes;
        assert!(p.values_changed.contains_key("root['version']"));
        assert!(p.dictionary_item_added.contains("root['extra']"));
        assert!(p.dictionary_item_removed.contains("root['old']"));
    }

    #[test]
    fn list_order_is_ignored_by_default() {
        let old = json!({"fields": ["a", "b", "c"]});
        let new = json!({"fields": ["c", "a", "b"]});
        assert!(diff_json(&new, &old, true).is_empty());

        let ordered = diff_json(&new, &old, false);
        assert_eq!(ordered.values_changed.len(), 3);
    }

    #[test]
    fn unordered_list_reports_unmatched_items() {
        let old = json!(["a", "b"]);
        let new = json!(["b", "z"]);
        let d = diff_json(&new, &old, true);
        assert_eq!(d.iterable_item_added["root[1]"], json!("z"));
        assert_eq!(d.iterable_item_removed["root[0]"], json!("a"));
    }

    #[test]
    fn type_change_is_its_own_bucket() {
        let d = diff_json(&json!({"v": "1"}), &json!({"v": 1}), true);
        let change = &d.type_changes["root['v']"];
        assert_eq!(change.old_type, "number");
        assert_eq!(change.new_type, "string");
        assert!(d.values_changed.is_empty());
    }
}
