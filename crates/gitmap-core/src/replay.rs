//! Undo or replay one commit's layer changes on top of another document.
//!
//! These are structural transforms over `(current, commit, parent)`, not merges:
//! an unrelated edit to the same id in `current` is overwritten.

use crate::document::{entries, entry_id, set_entries, Collection, Document, EntryIndex};
use serde_json::Value;

/// Undo the changes `commit` made relative to `parent`, applied to `current`.
pub fn revert_changes(current: &Document, commit: &Document, parent: &Document) -> Document {
    let mut out = current.clone();
    for collection in Collection::ALL {
        let list = revert_collection(
            entries(current, collection),
            &EntryIndex::of(commit, collection),
            &EntryIndex::of(parent, collection),
        );
        set_entries(&mut out, collection, list);
    }
    out
}

fn revert_collection(current: &[Value], commit: &EntryIndex, parent: &EntryIndex) -> Vec<Value> {
    let live = EntryIndex::new(current);
    let mut list = Vec::with_capacity(current.len());

    for entry in current {
        let Some(id) = entry_id(entry) else {
            list.push(entry.clone());
            continue;
        };
        match (commit.get(&id), parent.get(&id)) {
            // added by the commit
            (Some(_), None) => {}
            (Some(c), Some(p)) if c != p => list.push(p.clone()),
            _ => list.push(entry.clone()),
        }
    }

    // Entries the commit removed come back unless something re-added them.
    for id in parent.ids() {
        if commit.contains(id) || live.contains(id) {
            continue;
        }
        if let Some(p) = parent.get(id) {
            list.push(p.clone());
        }
    }
    list
}

/// Replay the changes `commit` made relative to `parent` onto `current`.
pub fn cherry_pick_changes(current: &Document, commit: &Document, parent: &Document) -> Document {
    let mut out = current.clone();
    for collection in Collection::ALL {
        let list = cherry_pick_collection(
            entries(current, collection),
            &EntryIndex::of(commit, collection),
            &EntryIndex::of(parent, collection),
        );
        set_entries(&mut out, collection, list);
    }
    out
}

fn cherry_pick_collection(current: &[Value], commit: &EntryIndex, parent: &EntryIndex) -> Vec<Value> {
    let live = EntryIndex::new(current);
    let mut list = Vec::with_capacity(current.len());

    for entry in current {
        let Some(id) = entry_id(entry) else {
            list.push(entry.clone());
            continue;
        };
        match (commit.get(&id), parent.get(&id)) {
            (Some(c), Some(p)) if c != p => list.push(c.clone()),
            // removed by the commit
            (None, Some(_)) => {}
            _ => list.push(entry.clone()),
        }
    }

    for id in commit.ids() {
        if parent.contains(id) || live.contains(id) {
            continue;
        }
        if let Some(c) = commit.get(id) {
            list.push(c.clone());
        }
    }
    list
}
