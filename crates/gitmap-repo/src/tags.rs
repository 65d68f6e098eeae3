use crate::fsio::{list_ref_files, read_ref, remove_ref, write_ref};
use crate::repository::Repository;
use gitmap_context::event_type;
use gitmap_core::{GitMapError, Result};
use serde_json::json;

/// Tag names may nest with `/` but carry no whitespace or empty/relative segments.
fn validate_tag_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.chars().any(char::is_whitespace)
        && name
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if ok {
        Ok(())
    } else {
        Err(GitMapError::InvalidTagName(name.to_string()))
    }
}

impl Repository {
    /// Tag `commit_id` (default: HEAD's commit). Returns the tagged commit id.
    pub fn create_tag(&self, name: &str, commit_id: Option<&str>) -> Result<String> {
        validate_tag_name(name)?;
        let path = self.paths.tag_ref(name);
        if path.is_file() {
            return Err(GitMapError::TagExists(name.to_string()));
        }
        let target = match commit_id {
            Some(id) => self.commit(id)?.id,
            None => self.head_commit_id()?.ok_or(GitMapError::NoCommits)?,
        };
        write_ref(&path, Some(&target))?;

        self.record_event(
            event_type::TAG,
            Some(name),
            json!({"action": "create", "tag": name, "commit_id": target}),
        );
        Ok(target)
    }

    /// Remove a tag. The commit it pointed at is untouched.
    pub fn delete_tag(&self, name: &str) -> Result<()> {
        let target = self
            .get_tag(name)?
            .ok_or_else(|| GitMapError::TagNotFound(name.to_string()))?;
        remove_ref(&self.paths.tag_ref(name), &self.paths.tags_dir)?;

        self.record_event(
            event_type::TAG,
            Some(name),
            json!({"action": "delete", "tag": name, "commit_id": target}),
        );
        Ok(())
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        list_ref_files(&self.paths.tags_dir)
    }

    /// Commit id a tag points at.
    pub fn get_tag(&self, name: &str) -> Result<Option<String>> {
        if validate_tag_name(name).is_err() {
            return Ok(None);
        }
        read_ref(&self.paths.tag_ref(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmap_core::Document;

    fn tmp_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), "p", "ana", "").unwrap();
        (dir, repo)
    }

    #[test]
    fn tag_requires_a_commit() {
        let (_dir, repo) = tmp_repo();
        assert!(matches!(repo.create_tag("v1", None), Err(GitMapError::NoCommits)));
        assert!(matches!(
            repo.create_tag("v1", Some("0123456789ab")),
            Err(GitMapError::CommitNotFound(_))
        ));
    }

    #[test]
    fn create_list_get_delete() {
        let (_dir, repo) = tmp_repo();
        repo.update_index(&Document::new()).unwrap();
        let first = repo.create_commit("one", None, None).unwrap();

        assert_eq!(repo.create_tag("v1.0", None).unwrap(), first.id);
        repo.create_tag("release/2024-q1", Some(&first.id)).unwrap();
        assert_eq!(repo.list_tags().unwrap(), vec!["release/2024-q1", "v1.0"]);
        assert_eq!(repo.get_tag("v1.0").unwrap().as_deref(), Some(first.id.as_str()));
        assert_eq!(repo.get_tag("missing").unwrap(), None);

        assert!(matches!(
            repo.create_tag("v1.0", None),
            Err(GitMapError::TagExists(_))
        ));

        repo.delete_tag("release/2024-q1").unwrap();
        assert_eq!(repo.list_tags().unwrap(), vec!["v1.0"]);
        assert!(repo.commit(&first.id).is_ok());
        assert!(matches!(
            repo.delete_tag("release/2024-q1"),
            Err(GitMapError::TagNotFound(_))
        ));

        let store = repo.context_store().unwrap();
        let events = store.events_by_type("tag", 10).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].payload["action"], "delete");
    }

    #[test]
    fn invalid_tag_names() {
        let (_dir, repo) = tmp_repo();
        repo.create_commit("one", None, None).unwrap();
        for bad in ["", "has space", "tab\tname", "../up", "a//b"] {
            assert!(
                matches!(repo.create_tag(bad, None), Err(GitMapError::InvalidTagName(_))),
                "{bad:?}"
            );
        }
    }
}
