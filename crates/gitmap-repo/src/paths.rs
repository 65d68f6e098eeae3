use gitmap_core::{GitMapError, Result};
use std::path::{Path, PathBuf};

pub const GITMAP_DIR: &str = ".gitmap";

/// All well-known paths under `.gitmap/`.
#[derive(Debug, Clone)]
pub struct GitMapPaths {
    pub root: PathBuf,
    pub gitmap_dir: PathBuf,
    pub config_json: PathBuf,
    pub head_file: PathBuf,
    pub index_json: PathBuf,
    pub refs_dir: PathBuf,
    pub heads_dir: PathBuf,
    pub tags_dir: PathBuf,
    pub remotes_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub commits_dir: PathBuf,
    pub stash_dir: PathBuf,
    pub stash_entries_json: PathBuf,
    pub context_db: PathBuf,
}

impl GitMapPaths {
    /// Derive all paths from a repo root. Pure computation, no I/O.
    pub fn discover(repo_root: impl Into<PathBuf>) -> Self {
        let root = repo_root.into();
        let gitmap_dir = root.join(GITMAP_DIR);
        let refs_dir = gitmap_dir.join("refs");
        let objects_dir = gitmap_dir.join("objects");
        let stash_dir = gitmap_dir.join("stash");
        Self {
            config_json: gitmap_dir.join("config.json"),
            head_file: gitmap_dir.join("HEAD"),
            index_json: gitmap_dir.join("index.json"),
            heads_dir: refs_dir.join("heads"),
            tags_dir: refs_dir.join("tags"),
            remotes_dir: refs_dir.join("remotes"),
            commits_dir: objects_dir.join("commits"),
            stash_entries_json: stash_dir.join("entries.json"),
            context_db: gitmap_dir.join("context.db"),
            stash_dir,
            objects_dir,
            refs_dir,
            gitmap_dir,
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.heads_dir,
            &self.tags_dir,
            &self.remotes_dir,
            &self.commits_dir,
            &self.stash_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(GitMapError::io(dir))?;
        }
        Ok(())
    }

    /// Check whether `.gitmap/` exists.
    pub fn is_initialized(&self) -> bool {
        self.gitmap_dir.is_dir()
    }

    pub fn branch_ref(&self, name: &str) -> PathBuf {
        self.heads_dir.join(name)
    }

    pub fn tag_ref(&self, name: &str) -> PathBuf {
        self.tags_dir.join(name)
    }

    pub fn remote_ref(&self, remote: &str, branch: &str) -> PathBuf {
        self.remotes_dir.join(remote).join(branch)
    }

    pub fn commit_object(&self, id: &str) -> PathBuf {
        self.commits_dir.join(format!("{id}.json"))
    }

    /// Walk up from `start` looking for a directory containing `.gitmap/`.
    /// Returns `None` if not found.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(GITMAP_DIR).is_dir() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }
}

/// Check a branch or remote name: `/`-separated segments, none of them empty,
/// `.` or `..`, and no control characters. Any other text is allowed, so every
/// ref found under `refs/heads/` round-trips.
pub fn validate_ref_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.chars().any(char::is_control)
        && name
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if ok {
        Ok(())
    } else {
        Err(GitMapError::InvalidRefName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_builds_correct_paths() {
        let p = GitMapPaths::discover("/tmp/repo");
        assert_eq!(p.gitmap_dir, PathBuf::from("/tmp/repo/.gitmap"));
        assert_eq!(p.head_file, PathBuf::from("/tmp/repo/.gitmap/HEAD"));
        assert_eq!(p.index_json, PathBuf::from("/tmp/repo/.gitmap/index.json"));
        assert_eq!(
            p.branch_ref("feature/roads"),
            PathBuf::from("/tmp/repo/.gitmap/refs/heads/feature/roads")
        );
        assert_eq!(
            p.remote_ref("origin", "main"),
            PathBuf::from("/tmp/repo/.gitmap/refs/remotes/origin/main")
        );
        assert_eq!(
            p.commit_object("0123456789ab"),
            PathBuf::from("/tmp/repo/.gitmap/objects/commits/0123456789ab.json")
        );
        assert_eq!(
            p.stash_entries_json,
            PathBuf::from("/tmp/repo/.gitmap/stash/entries.json")
        );
        assert_eq!(p.context_db, PathBuf::from("/tmp/repo/.gitmap/context.db"));
    }

    #[test]
    fn ensure_layout_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let p = GitMapPaths::discover(tmp.path());
        assert!(!p.is_initialized());
        p.ensure_layout().unwrap();
        assert!(p.is_initialized());
        assert!(p.heads_dir.is_dir());
        assert!(p.tags_dir.is_dir());
        assert!(p.remotes_dir.is_dir());
        assert!(p.commits_dir.is_dir());
        assert!(p.stash_dir.is_dir());
    }

    #[test]
    fn find_root_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        GitMapPaths::discover(tmp.path()).ensure_layout().unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(GitMapPaths::find_root(&nested), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn ref_names() {
        for good in [
            "main",
            "feature/roads",
            "release-1.2",
            "a_b/c.d",
            "feature/año",
            "fix#12",
            "café",
            "has space",
        ] {
            assert!(validate_ref_name(good).is_ok(), "{good}");
        }
        for bad in ["", "/main", "main/", "a//b", "../x", "a/./b", "tab\t", "nul\0", "line\n"] {
            assert!(validate_ref_name(bad).is_err(), "{bad:?}");
        }
    }
}
