use crate::repository::{NewCommit, Repository};
use gitmap_context::{event_type, Relationship};
use gitmap_core::{cherry_pick_changes, revert_changes, Commit, Document, Result};
use serde_json::json;

impl Repository {
    /// Undo commit `commit_id` on top of the current index and commit the result.
    pub fn revert(&self, commit_id: &str, rationale: Option<&str>) -> Result<Commit> {
        let target = self.commit(commit_id)?;
        let parent_doc = self.parent_document(&target)?;
        let reverted = revert_changes(&self.index()?, &target.map_data, &parent_doc);
        let message = format!(
            "Revert \"{}\"\n\nThis reverts commit {}.",
            target.message,
            target.short_id()
        );

        let commit = self.commit_replay(&message, reverted)?;
        let event = self.record_commit_event(
            event_type::REVERT,
            &commit,
            rationale,
            json!({"reverted_commit": target.id}),
        );
        if let Some(event) = event {
            self.link_to_commit(&event, &target.id, Relationship::Reverts);
        }
        Ok(commit)
    }

    /// Replay commit `commit_id` on top of the current index and commit the result.
    pub fn cherry_pick(&self, commit_id: &str, rationale: Option<&str>) -> Result<Commit> {
        let source = self.commit(commit_id)?;
        let parent_doc = self.parent_document(&source)?;
        let picked = cherry_pick_changes(&self.index()?, &source.map_data, &parent_doc);
        let message = format!(
            "{}\n\n(cherry picked from commit {})",
            source.message,
            source.short_id()
        );

        let commit = self.commit_replay(&message, picked)?;
        let event = self.record_commit_event(
            event_type::CHERRY_PICK,
            &commit,
            rationale,
            json!({"source_commit": source.id}),
        );
        if let Some(event) = event {
            self.link_to_commit(&event, &source.id, Relationship::CherryPickedFrom);
        }
        Ok(commit)
    }

    fn parent_document(&self, commit: &Commit) -> Result<Document> {
        match &commit.parent {
            Some(id) => Ok(self.commit(id)?.map_data),
            None => Ok(Document::new()),
        }
    }

    fn commit_replay(&self, message: &str, map_data: Document) -> Result<Commit> {
        self.update_index(&map_data)?;
        self.write_commit(NewCommit {
            message,
            author: None,
            parent: self.head_commit_id()?,
            parent2: None,
            map_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmap_core::document::{entries, entry_id, Collection};
    use gitmap_core::GitMapError;
    use serde_json::Value;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn layer_ids(d: &Document) -> Vec<String> {
        entries(d, Collection::OperationalLayers)
            .iter()
            .filter_map(entry_id)
            .collect()
    }

    fn tmp_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), "p", "ana", "").unwrap();
        (dir, repo)
    }

    fn commit(repo: &Repository, value: Value, message: &str) -> Commit {
        repo.update_index(&doc(value)).unwrap();
        repo.create_commit(message, None, None).unwrap()
    }

    #[test]
    fn revert_of_an_addition_restores_parent() {
        let (_dir, repo) = tmp_repo();
        let parent = commit(&repo, json!({"operationalLayers": [{"id": "a"}], "version": "2"}), "base");
        let added = commit(
            &repo,
            json!({"operationalLayers": [{"id": "a"}, {"id": "L", "title": "New"}], "version": "2"}),
            "add L",
        );

        let reverted = repo.revert(&added.id, None).unwrap();
        assert_eq!(reverted.map_data, parent.map_data);
        assert_eq!(reverted.parent.as_deref(), Some(added.id.as_str()));
        assert_eq!(
            reverted.message,
            format!("Revert \"add L\"\n\nThis reverts commit {}.", &added.id[..8])
        );
        assert_eq!(repo.index().unwrap(), parent.map_data);
        assert_eq!(repo.head_commit_id().unwrap().as_deref(), Some(reverted.id.as_str()));
    }

    #[test]
    fn revert_keeps_unrelated_later_work() {
        let (_dir, repo) = tmp_repo();
        commit(&repo, json!({"operationalLayers": [{"id": "a"}]}), "base");
        let added = commit(&repo, json!({"operationalLayers": [{"id": "a"}, {"id": "b"}]}), "add b");
        commit(&repo, json!({"operationalLayers": [{"id": "a"}, {"id": "b"}, {"id": "c"}]}), "add c");

        let reverted = repo.revert(&added.id, None).unwrap();
        assert_eq!(layer_ids(&reverted.map_data), vec!["a", "c"]);
    }

    #[test]
    fn cherry_pick_adds_layer_onto_other_branch() {
        let (_dir, repo) = tmp_repo();
        let base = commit(&repo, json!({"operationalLayers": [{"id": "a"}]}), "base");
        repo.create_branch("feature", None).unwrap();
        repo.checkout_branch("feature").unwrap();
        let picked_from = commit(
            &repo,
            json!({"operationalLayers": [{"id": "a"}, {"id": "L", "title": "New"}]}),
            "add L",
        );
        repo.checkout_branch("main").unwrap();

        let picked = repo.cherry_pick(&picked_from.id, None).unwrap();
        assert_eq!(picked.map_data, picked_from.map_data);
        assert_eq!(picked.parent.as_deref(), Some(base.id.as_str()));
        assert_eq!(
            picked.message,
            format!("add L\n\n(cherry picked from commit {})", &picked_from.id[..8])
        );
        assert_eq!(repo.branch_commit("main").unwrap().as_deref(), Some(picked.id.as_str()));
    }

    #[test]
    fn unknown_commit_is_an_error() {
        let (_dir, repo) = tmp_repo();
        assert!(matches!(
            repo.revert("0123456789ab", None),
            Err(GitMapError::CommitNotFound(_))
        ));
        assert!(matches!(
            repo.cherry_pick("0123456789ab", None),
            Err(GitMapError::CommitNotFound(_))
        ));
    }

    #[test]
    fn revert_and_cherry_pick_link_events() {
        let (_dir, repo) = tmp_repo();
        commit(&repo, json!({"operationalLayers": []}), "base");
        let added = commit(&repo, json!({"operationalLayers": [{"id": "x"}]}), "add x");
        let reverted = repo.revert(&added.id, Some("x broke the legend")).unwrap();
        let picked = repo.cherry_pick(&added.id, None).unwrap();

        let store = repo.context_store().unwrap();
        let original = store.latest_event_for_ref(&added.id).unwrap().unwrap();
        assert_eq!(original.event_type, "commit");

        let revert_event = store.latest_event_for_ref(&reverted.id).unwrap().unwrap();
        assert_eq!(revert_event.event_type, "revert");
        assert_eq!(revert_event.payload["reverted_commit"], added.id.as_str());
        assert_eq!(
            store.get_annotations(&revert_event.id).unwrap()[0].content,
            "x broke the legend"
        );

        let related = store
            .get_related_events(&original.id, Some(Relationship::Reverts))
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].0.id, revert_event.id);

        let pick_event = store.latest_event_for_ref(&picked.id).unwrap().unwrap();
        let edges = store.get_edges(&pick_event.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship, Relationship::CherryPickedFrom);
        assert_eq!(edges[0].target_id, original.id);
    }
}
