//! Best-effort writes to the context store.
//!
//! Provenance never fails a repository operation: errors are logged and the
//! write is skipped.

use crate::repository::Repository;
use gitmap_context::{event_type, ContextStore, Event, NewEvent, Relationship};
use gitmap_core::document::{entries, Collection};
use gitmap_core::Commit;
use serde_json::{json, Value};

/// Event types whose `ref` is the commit they wrote.
const COMMIT_EVENT_TYPES: [&str; 4] = [
    event_type::COMMIT,
    event_type::MERGE,
    event_type::REVERT,
    event_type::CHERRY_PICK,
];

impl Repository {
    /// Run `f` against the context store, logging instead of propagating failure.
    pub(crate) fn record<T>(
        &self,
        what: &str,
        f: impl FnOnce(&ContextStore, &str) -> anyhow::Result<T>,
    ) -> Option<T> {
        let repo = self.paths.root.display().to_string();
        let result = ContextStore::open(&self.paths.context_db).and_then(|store| f(&store, &repo));
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(what, error = %format!("{error:#}"), "context recording failed");
                None
            }
        }
    }

    pub(crate) fn record_event(
        &self,
        kind: &str,
        reference: Option<&str>,
        payload: Value,
    ) -> Option<Event> {
        let actor = self.config().ok().map(|c| c.author().to_string());
        self.record(kind, |store, repo| {
            let mut new = NewEvent::new(kind, repo, payload);
            new.reference = reference;
            new.actor = actor.as_deref();
            store.record_event(&new)
        })
    }

    /// Record an event for a freshly written commit.
    ///
    /// `extra` is merged into the standard commit payload.
    pub(crate) fn record_commit_event(
        &self,
        kind: &str,
        commit: &Commit,
        rationale: Option<&str>,
        extra: Value,
    ) -> Option<Event> {
        let branch = self.current_branch().ok().flatten();
        let mut payload = json!({
            "message": commit.message,
            "parent": commit.parent,
            "parent2": commit.parent2,
            "layers_count": entries(&commit.map_data, Collection::OperationalLayers).len(),
            "branch": branch,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            target.extend(extra);
        }

        self.record(kind, |store, repo| {
            let mut new = NewEvent::new(kind, repo, payload);
            new.reference = Some(&commit.id);
            new.actor = Some(&commit.author);
            new.rationale = rationale;
            store.record_event(&new)
        })
    }

    /// Link `source` to the event that created commit `original`, if recorded.
    pub(crate) fn link_to_commit(
        &self,
        source: &Event,
        original: &str,
        relationship: Relationship,
    ) {
        self.record("edge", |store, _| {
            let creator = store
                .events_by_ref(original, 50)?
                .into_iter()
                .find(|e| COMMIT_EVENT_TYPES.contains(&e.event_type.as_str()));
            if let Some(target) = creator {
                store.add_edge(
                    &source.id,
                    &target.id,
                    relationship,
                    Some(&json!({"commit_id": original})),
                )?;
            }
            Ok(())
        });
    }
}
