//! Remote tracking refs and the boundary to a hosted map service.

use crate::fsio::{read_ref, write_ref};
use crate::paths::validate_ref_name;
use crate::repository::Repository;
use gitmap_context::event_type;
use gitmap_core::{Document, GitMapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_REMOTE: &str = "origin";

/// What the hosted service reports after a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// Identifier of the item the document was written to.
    pub item_ref: String,
    pub notification_status: String,
}

/// A hosted map-document service. Implemented outside this crate.
pub trait RemoteSync {
    fn push(&self, branch: &str, document: &Document) -> anyhow::Result<PushReceipt>;
    fn pull(&self, branch: &str) -> anyhow::Result<Document>;
}

impl Repository {
    /// Last commit id seen on `remote` for `branch`. Advisory only.
    pub fn remote_ref(&self, remote: &str, branch: &str) -> Result<Option<String>> {
        validate_ref_name(remote)?;
        validate_ref_name(branch)?;
        read_ref(&self.paths.remote_ref(remote, branch))
    }

    pub fn update_remote_ref(&self, remote: &str, branch: &str, commit_id: &str) -> Result<()> {
        validate_ref_name(remote)?;
        validate_ref_name(branch)?;
        write_ref(&self.paths.remote_ref(remote, branch), Some(commit_id))
    }

    /// Push `branch`'s latest snapshot and advance its `origin` tracking ref.
    pub fn push_with(&self, remote: &dyn RemoteSync, branch: &str) -> Result<PushReceipt> {
        let commit_id = self
            .branch_commit(branch)?
            .ok_or_else(|| GitMapError::EmptyBranch(branch.to_string()))?;
        let commit = self.commit(&commit_id)?;

        let receipt = remote
            .push(branch, &commit.map_data)
            .map_err(|e| GitMapError::Remote(format!("{e:#}")))?;
        self.update_remote_ref(DEFAULT_REMOTE, branch, &commit.id)?;

        self.record_event(
            event_type::PUSH,
            Some(&commit.id),
            json!({
                "branch": branch,
                "commit_id": commit.id,
                "item_ref": receipt.item_ref,
                "notification_status": receipt.notification_status,
            }),
        );
        Ok(receipt)
    }

    /// Stage the remote's document for `branch`. The caller commits it.
    pub fn pull_with(&self, remote: &dyn RemoteSync, branch: &str) -> Result<Document> {
        validate_ref_name(branch)?;
        let document = remote
            .pull(branch)
            .map_err(|e| GitMapError::Remote(format!("{e:#}")))?;
        self.update_index(&document)?;

        let head = self.head_commit_id()?;
        if let Some(id) = &head {
            self.update_remote_ref(DEFAULT_REMOTE, branch, id)?;
        }

        self.record_event(
            event_type::PULL,
            Some(branch),
            json!({"branch": branch, "head": head}),
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmap_core::Commit;
    use serde_json::Value;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeRemote {
        pushed: RefCell<Vec<(String, Document)>>,
        served: Document,
        fail: bool,
    }

    impl RemoteSync for FakeRemote {
        fn push(&self, branch: &str, document: &Document) -> anyhow::Result<PushReceipt> {
            if self.fail {
                anyhow::bail!("service unavailable");
            }
            self.pushed
                .borrow_mut()
                .push((branch.to_string(), document.clone()));
            Ok(PushReceipt {
                item_ref: "item-42".into(),
                notification_status: "sent".into(),
            })
        }

        fn pull(&self, _branch: &str) -> anyhow::Result<Document> {
            if self.fail {
                anyhow::bail!("service unavailable");
            }
            Ok(self.served.clone())
        }
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn repo_with_commit() -> (tempfile::TempDir, Repository, Commit) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), "p", "ana", "").unwrap();
        repo.update_index(&doc(json!({"operationalLayers": [{"id": "l1"}]})))
            .unwrap();
        let commit = repo.create_commit("init", None, None).unwrap();
        (dir, repo, commit)
    }

    #[test]
    fn remote_refs_are_nested_per_branch() {
        let (_dir, repo, commit) = repo_with_commit();
        assert_eq!(repo.remote_ref("origin", "feature/roads").unwrap(), None);
        repo.update_remote_ref("origin", "feature/roads", &commit.id)
            .unwrap();
        assert_eq!(
            repo.remote_ref("origin", "feature/roads").unwrap().as_deref(),
            Some(commit.id.as_str())
        );
        assert!(repo
            .paths
            .remotes_dir
            .join("origin/feature/roads")
            .is_file());
        assert!(matches!(
            repo.update_remote_ref("..", "main", &commit.id),
            Err(GitMapError::InvalidRefName(_))
        ));
    }

    #[test]
    fn push_updates_tracking_ref() {
        let (_dir, repo, commit) = repo_with_commit();
        let remote = FakeRemote::default();
        let receipt = repo.push_with(&remote, "main").unwrap();
        assert_eq!(receipt.item_ref, "item-42");
        assert_eq!(remote.pushed.borrow()[0].1, commit.map_data);
        assert_eq!(
            repo.remote_ref(DEFAULT_REMOTE, "main").unwrap().as_deref(),
            Some(commit.id.as_str())
        );

        let store = repo.context_store().unwrap();
        let event = store.events_by_type("push", 1).unwrap().remove(0);
        assert_eq!(event.payload["notification_status"], "sent");
    }

    #[test]
    fn failed_push_leaves_tracking_ref() {
        let (_dir, repo, _) = repo_with_commit();
        let remote = FakeRemote {
            fail: true,
            ..FakeRemote::default()
        };
        let err = repo.push_with(&remote, "main").unwrap_err();
        assert!(matches!(err, GitMapError::Remote(ref m) if m.contains("unavailable")));
        assert_eq!(repo.remote_ref(DEFAULT_REMOTE, "main").unwrap(), None);
    }

    #[test]
    fn pull_stages_remote_document() {
        let (_dir, repo, commit) = repo_with_commit();
        let served = doc(json!({"operationalLayers": [{"id": "l1"}, {"id": "remote"}]}));
        let remote = FakeRemote {
            served: served.clone(),
            ..FakeRemote::default()
        };
        assert_eq!(repo.pull_with(&remote, "main").unwrap(), served);
        assert_eq!(repo.index().unwrap(), served);
        assert!(repo.has_uncommitted_changes().unwrap());
        assert_eq!(
            repo.remote_ref(DEFAULT_REMOTE, "main").unwrap().as_deref(),
            Some(commit.id.as_str())
        );
    }
}
