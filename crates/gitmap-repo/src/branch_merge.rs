//! Merging one branch into the current one.

use crate::repository::{NewCommit, Repository};
use gitmap_context::event_type;
use gitmap_core::{merge_maps, Commit, GitMapError, MergeResult, Result};
use serde_json::json;

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// The merged document was committed with the source as second parent.
    Committed { commit: Commit, result: MergeResult },
    /// Nothing was written; resolve the conflicts and call
    /// [`Repository::commit_merge`].
    Conflicted(MergeResult),
    /// The source is already contained in the current branch.
    UpToDate,
}

impl Repository {
    /// Three-way merge of `source` into the current branch.
    ///
    /// The index is merged against the source snapshot, with their common
    /// ancestor as base. A clean result is staged and committed.
    pub fn merge_branch(&self, source: &str, message: Option<&str>) -> Result<MergeOutcome> {
        let current = self.require_branch()?;
        if current == source {
            return Err(GitMapError::MergeIntoSelf(source.to_string()));
        }
        let source_id = self
            .branch_commit(source)?
            .ok_or_else(|| GitMapError::EmptyBranch(source.to_string()))?;
        let theirs = self.commit(&source_id)?;
        let head_id = self.head_commit_id()?;

        let base_id = match &head_id {
            Some(head) => self.find_common_ancestor(head, &source_id)?,
            None => None,
        };
        if base_id.as_deref() == Some(source_id.as_str()) {
            return Ok(MergeOutcome::UpToDate);
        }
        let base = match &base_id {
            Some(id) => Some(self.commit(id)?.map_data),
            None => None,
        };

        let result = merge_maps(&self.index()?, &theirs.map_data, base.as_ref());
        if result.has_conflicts() {
            tracing::debug!(source, conflicts = result.conflicts.len(), "merge has conflicts");
            return Ok(MergeOutcome::Conflicted(result));
        }
        let commit = self.commit_merge(&result, source, message)?;
        Ok(MergeOutcome::Committed { commit, result })
    }

    /// Commit a fully resolved merge of `source` into the current branch.
    pub fn commit_merge(
        &self,
        result: &MergeResult,
        source: &str,
        message: Option<&str>,
    ) -> Result<Commit> {
        if result.has_conflicts() {
            return Err(GitMapError::UnresolvedConflicts(result.conflicts.len()));
        }
        let current = self.require_branch()?;
        let source_id = self
            .branch_commit(source)?
            .ok_or_else(|| GitMapError::EmptyBranch(source.to_string()))?;
        let message = match message {
            Some(m) => m.to_string(),
            None => format!("Merge branch '{source}' into {current}"),
        };

        self.update_index(&result.merged_document)?;
        let commit = self.write_commit(NewCommit {
            message: &message,
            author: None,
            parent: self.head_commit_id()?,
            parent2: Some(source_id.clone()),
            map_data: result.merged_document.clone(),
        })?;

        self.record_commit_event(
            event_type::MERGE,
            &commit,
            None,
            json!({
                "source_branch": source,
                "target_branch": current,
                "commit_id": commit.id,
                "added_ids": result.added_ids,
                "modified_ids": result.modified_ids,
            }),
        );
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmap_core::document::{entries, entry_id, Collection};
    use gitmap_core::{apply_resolution, resolve_conflict, Document, Resolution};
    use serde_json::Value;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn commit(repo: &Repository, value: Value, message: &str) -> Commit {
        repo.update_index(&doc(value)).unwrap();
        repo.create_commit(message, None, None).unwrap()
    }

    fn layer_ids(d: &Document) -> Vec<String> {
        entries(d, Collection::OperationalLayers)
            .iter()
            .filter_map(entry_id)
            .collect()
    }

    /// main and `side` both diverge from a shared base.
    fn diverged(ours: Value, theirs: Value) -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), "p", "ana", "").unwrap();
        commit(&repo, json!({"operationalLayers": [{"id": "L1", "title": "A"}]}), "base");
        repo.create_branch("side", None).unwrap();
        repo.checkout_branch("side").unwrap();
        commit(&repo, theirs, "theirs");
        repo.checkout_branch("main").unwrap();
        commit(&repo, ours, "ours");
        (dir, repo)
    }

    #[test]
    fn clean_merge_commits_with_second_parent() {
        let (_dir, repo) = diverged(
            json!({"operationalLayers": [{"id": "L1", "title": "A"}, {"id": "mine"}]}),
            json!({"operationalLayers": [{"id": "L1", "title": "A2"}, {"id": "theirs"}]}),
        );
        let side = repo.branch_commit("side").unwrap().unwrap();
        let head = repo.head_commit_id().unwrap();

        let MergeOutcome::Committed { commit, result } = repo.merge_branch("side", None).unwrap()
        else {
            panic!("expected a clean merge");
        };
        assert_eq!(commit.message, "Merge branch 'side' into main");
        assert_eq!(commit.parent, head);
        assert_eq!(commit.parent2.as_deref(), Some(side.as_str()));
        assert_eq!(layer_ids(&commit.map_data), vec!["L1", "mine", "theirs"]);
        assert_eq!(entries(&commit.map_data, Collection::OperationalLayers)[0]["title"], "A2");
        assert_eq!(result.added_ids, vec!["theirs".to_string()]);
        assert_eq!(result.modified_ids, vec!["L1".to_string()]);
        assert_eq!(repo.index().unwrap(), commit.map_data);

        let store = repo.context_store().unwrap();
        let event = store.latest_event_for_ref(&commit.id).unwrap().unwrap();
        assert_eq!(event.event_type, "merge");
        assert_eq!(event.payload["source_branch"], "side");
    }

    #[test]
    fn conflicting_merge_writes_nothing_until_resolved() {
        let (_dir, repo) = diverged(
            json!({"operationalLayers": [{"id": "L1", "title": "B"}]}),
            json!({"operationalLayers": [{"id": "L1", "title": "C"}]}),
        );
        let head = repo.head_commit_id().unwrap();

        let MergeOutcome::Conflicted(mut result) = repo.merge_branch("side", None).unwrap() else {
            panic!("expected conflicts");
        };
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].base.as_ref().unwrap()["title"], "A");
        assert_eq!(repo.head_commit_id().unwrap(), head);

        assert!(matches!(
            repo.commit_merge(&result, "side", None),
            Err(GitMapError::UnresolvedConflicts(1))
        ));

        let value = resolve_conflict(&result.conflicts[0], Resolution::Theirs).unwrap();
        apply_resolution(&mut result, "L1", value);
        let merged = repo.commit_merge(&result, "side", Some("take theirs")).unwrap();
        assert_eq!(merged.message, "take theirs");
        assert!(merged.is_merge());
        assert_eq!(entries(&merged.map_data, Collection::OperationalLayers)[0]["title"], "C");
    }

    #[test]
    fn merge_preconditions() {
        let (_dir, repo) = diverged(json!({"v": 1}), json!({"v": 2}));
        assert!(matches!(
            repo.merge_branch("main", None),
            Err(GitMapError::MergeIntoSelf(_))
        ));
        assert!(matches!(
            repo.merge_branch("nope", None),
            Err(GitMapError::BranchNotFound(_))
        ));

        repo.update_branch("fresh", "").unwrap();
        assert!(matches!(
            repo.merge_branch("fresh", None),
            Err(GitMapError::EmptyBranch(_))
        ));

        let head = repo.head_commit_id().unwrap().unwrap();
        repo.checkout_commit(&head).unwrap();
        assert!(matches!(
            repo.merge_branch("side", None),
            Err(GitMapError::DetachedHead)
        ));
    }

    #[test]
    fn merging_an_ancestor_is_up_to_date() {
        let (_dir, repo) = diverged(json!({"v": 1}), json!({"v": 2}));
        let base = repo.history(None, None).unwrap().last().unwrap().id.clone();
        repo.create_branch("old", Some(&base)).unwrap();
        assert!(matches!(
            repo.merge_branch("old", None).unwrap(),
            MergeOutcome::UpToDate
        ));
    }
}
