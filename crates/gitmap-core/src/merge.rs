//! Layer-level three-way merge.
//!
//! `operationalLayers` and `tables` are merged entry by entry, keyed by id.
//! Every other top-level property comes from `ours` unchanged.

use crate::document::{
    entries, entry_id, entry_title, is_deletion, set_entries, Collection, Document, EntryIndex,
};
use crate::error::{GitMapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// An entry both sides touched in incompatible ways.
///
/// A deleted side is represented by an empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub id: String,
    pub title: String,
    pub collection: Collection,
    pub ours: Value,
    pub theirs: Value,
    pub base: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub merged_document: Document,
    pub conflicts: Vec<MergeConflict>,
    pub added_ids: Vec<String>,
    pub modified_ids: Vec<String>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflict(&self, id: &str) -> Option<&MergeConflict> {
        self.conflicts.iter().find(|c| c.id == id)
    }

    /// Resolve every remaining conflict with the same strategy.
    ///
    /// Nothing is applied if any conflict cannot take the strategy.
    pub fn resolve_all(&mut self, strategy: Resolution) -> Result<()> {
        let choices = self
            .conflicts
            .iter()
            .map(|c| resolve_conflict(c, strategy).map(|value| (c.id.clone(), value)))
            .collect::<Result<Vec<_>>>()?;
        for (id, value) in choices {
            apply_resolution(self, &id, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Ours,
    Theirs,
    Base,
}

impl FromStr for Resolution {
    type Err = GitMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "base" => Ok(Self::Base),
            other => Err(GitMapError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ours => "ours",
            Self::Theirs => "theirs",
            Self::Base => "base",
        })
    }
}

/// Merge `theirs` into `ours`, optionally against their common ancestor.
pub fn merge_maps(ours: &Document, theirs: &Document, base: Option<&Document>) -> MergeResult {
    let mut merged = ours.clone();
    let mut conflicts = Vec::new();
    let mut added_ids = Vec::new();
    let mut modified_ids = Vec::new();

    for collection in Collection::ALL {
        let outcome = merge_collection(ours, theirs, base, collection);
        set_entries(&mut merged, collection, outcome.entries);
        conflicts.extend(outcome.conflicts);
        added_ids.extend(outcome.added);
        modified_ids.extend(outcome.modified);
    }

    MergeResult {
        success: conflicts.is_empty(),
        merged_document: merged,
        conflicts,
        added_ids,
        modified_ids,
    }
}

#[derive(Default)]
struct CollectionMerge {
    entries: Vec<Value>,
    conflicts: Vec<MergeConflict>,
    added: Vec<String>,
    modified: Vec<String>,
}

enum Pick<'a> {
    Ours,
    Theirs(&'a Value),
}

fn merge_collection(
    ours: &Document,
    theirs: &Document,
    base: Option<&Document>,
    collection: Collection,
) -> CollectionMerge {
    let ours_list = entries(ours, collection);
    let our_index = EntryIndex::new(ours_list);
    let their_index = EntryIndex::of(theirs, collection);
    let base_index = base.map(|b| EntryIndex::of(b, collection));
    let base_of = |id: &str| base_index.as_ref().and_then(|b| b.get(id));

    let mut out = CollectionMerge::default();
    let mut decided: HashSet<String> = HashSet::new();

    for entry in ours_list {
        let Some(id) = entry_id(entry) else {
            out.entries.push(entry.clone());
            continue;
        };
        let o = our_index.get(&id).unwrap_or(entry);
        let first = decided.insert(id.clone());

        let pick = match (their_index.get(&id), base_of(&id)) {
            (Some(t), _) if o == t => Pick::Ours,
            (Some(t), Some(b)) if o == b => Pick::Theirs(t),
            (Some(t), Some(b)) if t == b => Pick::Ours,
            (Some(t), b) => {
                if first {
                    out.conflicts.push(conflict(&id, collection, o, t, b));
                }
                Pick::Ours
            }
            // Deleted on their side after we changed it.
            (None, Some(b)) if o != b => {
                if first {
                    out.conflicts
                        .push(conflict(&id, collection, o, &deleted(), Some(b)));
                }
                Pick::Ours
            }
            (None, _) => Pick::Ours,
        };

        match pick {
            Pick::Ours => out.entries.push(entry.clone()),
            Pick::Theirs(t) => {
                if first {
                    out.entries.push(t.clone());
                    out.modified.push(id);
                }
            }
        }
    }

    for id in their_index.ids() {
        if our_index.contains(id) {
            continue;
        }
        let Some(t) = their_index.get(id) else { continue };
        match base_of(id) {
            None => {
                out.entries.push(t.clone());
                out.added.push(id.clone());
            }
            Some(b) if t == b => {}
            Some(b) => {
                out.conflicts
                    .push(conflict(id, collection, &deleted(), t, Some(b)));
            }
        }
    }

    out
}

fn deleted() -> Value {
    Value::Object(Map::new())
}

fn conflict(
    id: &str,
    collection: Collection,
    ours: &Value,
    theirs: &Value,
    base: Option<&Value>,
) -> MergeConflict {
    let named = if is_deletion(ours) { theirs } else { ours };
    MergeConflict {
        id: id.to_string(),
        title: entry_title(named),
        collection,
        ours: ours.clone(),
        theirs: theirs.clone(),
        base: base.cloned(),
    }
}

/// The value a strategy picks for one conflict.
pub fn resolve_conflict(conflict: &MergeConflict, strategy: Resolution) -> Result<Value> {
    match strategy {
        Resolution::Ours => Ok(conflict.ours.clone()),
        Resolution::Theirs => Ok(conflict.theirs.clone()),
        Resolution::Base => conflict
            .base
            .clone()
            .ok_or_else(|| GitMapError::NoBaseVersion(conflict.id.clone())),
    }
}

/// Settle conflict `id` with `value` in the merged document.
///
/// An empty `value` deletes the entry; otherwise the entry is replaced, or
/// appended when the merged document does not have it.
pub fn apply_resolution(result: &mut MergeResult, id: &str, value: Value) {
    let from_conflict = result
        .conflicts
        .iter()
        .position(|c| c.id == id)
        .map(|pos| result.conflicts.remove(pos).collection);

    let collection = from_conflict.unwrap_or_else(|| {
        if EntryIndex::of(&result.merged_document, Collection::Tables).contains(id) {
            Collection::Tables
        } else {
            Collection::OperationalLayers
        }
    });

    let doc = &mut result.merged_document;
    let mut list = entries(doc, collection).to_vec();
    let matches = |entry: &Value| entry_id(entry).as_deref() == Some(id);

    if is_deletion(&value) {
        list.retain(|entry| !matches(entry));
    } else if let Some(pos) = list.iter().position(matches) {
        list[pos] = value;
        let mut seen = false;
        list.retain(|entry| {
            if !matches(entry) {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
    } else {
        list.push(value);
    }

    set_entries(doc, collection, list);
    result.success = result.conflicts.is_empty();
}
