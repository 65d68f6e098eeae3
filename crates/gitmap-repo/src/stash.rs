//! Stash stack stored newest-first in `.gitmap/stash/entries.json`.

use crate::fsio::{read_json, write_json};
use crate::repository::Repository;
use gitmap_context::event_type;
use gitmap_core::types::{short_id, stash_id};
use gitmap_core::{now_timestamp, GitMapError, Result, StashEntry};
use serde_json::json;

impl Repository {
    /// Entries newest first (`stash@{0}` is the most recent push).
    pub fn stash_list(&self) -> Result<Vec<StashEntry>> {
        let path = &self.paths.stash_entries_json;
        if !path.is_file() {
            return Ok(Vec::new());
        }
        read_json(path, "stash")
    }

    fn write_stash(&self, mut entries: Vec<StashEntry>) -> Result<()> {
        for (n, entry) in entries.iter_mut().enumerate() {
            entry.id = stash_id(n);
        }
        write_json(&self.paths.stash_entries_json, &entries)
    }

    /// Save the index on the stack and reset it to HEAD's snapshot.
    pub fn stash_push(&self, message: Option<&str>) -> Result<StashEntry> {
        if !self.has_uncommitted_changes()? {
            return Err(GitMapError::NothingToStash);
        }
        let branch = self.current_branch()?;
        let head = self.head_commit()?;
        let message = match message {
            Some(m) => m.to_string(),
            None => format!(
                "WIP on {}: {}",
                branch.as_deref().unwrap_or("HEAD"),
                head.as_ref().map_or("no commits", |c| short_id(&c.id))
            ),
        };

        let entry = StashEntry {
            id: stash_id(0),
            message,
            branch,
            timestamp: now_timestamp()?,
            index_data: self.index()?,
        };
        let mut entries = self.stash_list()?;
        entries.insert(0, entry.clone());
        // Stack first, then the index.
        self.write_stash(entries)?;
        self.update_index(&head.map(|c| c.map_data).unwrap_or_default())?;

        self.record_stash_event("push", &entry);
        Ok(entry)
    }

    /// Restore entry `index` into the index and remove it from the stack.
    pub fn stash_pop(&self, index: usize) -> Result<StashEntry> {
        let (entry, rest) = self.take_stash(index)?;
        self.update_index(&entry.index_data)?;
        self.write_stash(rest)?;
        self.record_stash_event("pop", &entry);
        Ok(entry)
    }

    /// Remove entry `index` without touching the index.
    pub fn stash_drop(&self, index: usize) -> Result<StashEntry> {
        let (entry, rest) = self.take_stash(index)?;
        self.write_stash(rest)?;
        self.record_stash_event("drop", &entry);
        Ok(entry)
    }

    /// Remove every entry. Returns how many there were.
    pub fn stash_clear(&self) -> Result<usize> {
        let count = self.stash_list()?.len();
        if count > 0 {
            self.write_stash(Vec::new())?;
            self.record_event(
                event_type::STASH,
                None,
                json!({"action": "clear", "count": count}),
            );
        }
        Ok(count)
    }

    fn take_stash(&self, index: usize) -> Result<(StashEntry, Vec<StashEntry>)> {
        let mut entries = self.stash_list()?;
        if entries.is_empty() {
            return Err(GitMapError::StashEmpty);
        }
        if index >= entries.len() {
            return Err(GitMapError::StashIndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        let entry = entries.remove(index);
        Ok((entry, entries))
    }

    fn record_stash_event(&self, action: &str, entry: &StashEntry) {
        self.record_event(
            event_type::STASH,
            entry.branch.as_deref(),
            json!({
                "action": action,
                "stash_id": entry.id,
                "message": entry.message,
                "branch": entry.branch,
            }),
        );
    }
}
