//! HEAD, branches, the index and commit objects.

use crate::fsio::{list_ref_files, read_json, read_ref, remove_ref, write_json, write_ref};
use crate::paths::{validate_ref_name, GitMapPaths};
use gitmap_context::{event_type, ContextStore};
use gitmap_core::hash::commit_id;
use gitmap_core::{
    diff_maps, now_timestamp, Branch, Commit, Document, GitMapError, MapDiff, RepoConfig, Result,
};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH: &str = "main";

const HEAD_REF_PREFIX: &str = "ref: refs/heads/";

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Branch(String),
    Detached(String),
}

/// Handle on a repository rooted at `paths.root`. Holds no other state.
#[derive(Debug, Clone)]
pub struct Repository {
    pub paths: GitMapPaths,
}

/// Everything needed to write a commit object.
pub(crate) struct NewCommit<'a> {
    pub message: &'a str,
    pub author: Option<&'a str>,
    pub parent: Option<String>,
    pub parent2: Option<String>,
    pub map_data: Document,
}

impl Repository {
    /// Bind to `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: GitMapPaths::discover(root),
        }
    }

    /// Create a repository with an empty `main` branch.
    pub fn init(
        root: impl Into<PathBuf>,
        project_name: &str,
        user_name: &str,
        user_email: &str,
    ) -> Result<Self> {
        let repo = Self::new(root);
        if repo.exists() {
            return Err(GitMapError::AlreadyExists(repo.paths.gitmap_dir.clone()));
        }
        repo.paths.ensure_layout()?;
        let origin = repo.paths.remotes_dir.join(crate::remote::DEFAULT_REMOTE);
        std::fs::create_dir_all(&origin).map_err(GitMapError::io(&origin))?;

        let config = RepoConfig {
            project_name: project_name.to_string(),
            user_name: user_name.to_string(),
            user_email: user_email.to_string(),
            ..RepoConfig::default()
        };
        write_json(&repo.paths.config_json, &config)?;
        repo.write_head(&Head::Branch(DEFAULT_BRANCH.to_string()))?;
        write_ref(&repo.paths.branch_ref(DEFAULT_BRANCH), None)?;
        write_json(&repo.paths.index_json, &Document::new())?;
        drop(repo.context_store()?);

        tracing::debug!(root = %repo.paths.root.display(), "initialized repository");
        Ok(repo)
    }

    /// Open an existing repository at exactly `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let repo = Self::new(root);
        if !repo.is_valid() {
            return Err(GitMapError::NotARepository(repo.paths.gitmap_dir.clone()));
        }
        Ok(repo)
    }

    /// Open the repository containing `start` or any of its ancestors.
    pub fn discover(start: &Path) -> Result<Self> {
        match GitMapPaths::find_root(start) {
            Some(root) => Self::open(root),
            None => Err(GitMapError::NotARepository(start.join(crate::paths::GITMAP_DIR))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn exists(&self) -> bool {
        self.paths.is_initialized()
    }

    /// All required files and directories are present.
    pub fn is_valid(&self) -> bool {
        self.exists()
            && self.paths.config_json.is_file()
            && self.paths.head_file.is_file()
            && self.paths.heads_dir.is_dir()
            && self.paths.commits_dir.is_dir()
    }

    // ── Config ──────────────────────────────────────────────────────

    pub fn config(&self) -> Result<RepoConfig> {
        read_json(&self.paths.config_json, "config")
    }

    pub fn update_config(&self, config: &RepoConfig) -> Result<()> {
        write_json(&self.paths.config_json, config)
    }

    // ── HEAD ────────────────────────────────────────────────────────

    pub fn head(&self) -> Result<Head> {
        let raw = read_ref(&self.paths.head_file)?.unwrap_or_default();
        Ok(match raw.strip_prefix(HEAD_REF_PREFIX) {
            Some(branch) => Head::Branch(branch.to_string()),
            None if raw.is_empty() => Head::Branch(DEFAULT_BRANCH.to_string()),
            None => Head::Detached(raw),
        })
    }

    pub(crate) fn write_head(&self, head: &Head) -> Result<()> {
        let content = match head {
            Head::Branch(name) => format!("{HEAD_REF_PREFIX}{name}"),
            Head::Detached(id) => id.clone(),
        };
        write_ref(&self.paths.head_file, Some(&content))
    }

    /// `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(match self.head()? {
            Head::Branch(name) => Some(name),
            Head::Detached(_) => None,
        })
    }

    /// The branch HEAD is attached to, or [`GitMapError::DetachedHead`].
    pub fn require_branch(&self) -> Result<String> {
        self.current_branch()?.ok_or(GitMapError::DetachedHead)
    }

    pub fn head_commit_id(&self) -> Result<Option<String>> {
        match self.head()? {
            Head::Branch(name) => Ok(read_ref(&self.paths.branch_ref(&name))?),
            Head::Detached(id) => Ok(Some(id)),
        }
    }

    pub fn head_commit(&self) -> Result<Option<Commit>> {
        match self.head_commit_id()? {
            Some(id) => self.get_commit(&id),
            None => Ok(None),
        }
    }

    /// Snapshot of the HEAD commit, or an empty document before the first commit.
    pub fn head_document(&self) -> Result<Document> {
        Ok(self
            .head_commit()?
            .map(|c| c.map_data)
            .unwrap_or_default())
    }

    // ── Branches ────────────────────────────────────────────────────

    /// Branch names, sorted, `/`-separated when nested.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        list_ref_files(&self.paths.heads_dir)
    }

    pub fn branches(&self) -> Result<Vec<Branch>> {
        self.list_branches()?
            .into_iter()
            .map(|name| {
                let commit_id = read_ref(&self.paths.branch_ref(&name))?;
                Ok(Branch { name, commit_id })
            })
            .collect()
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        validate_ref_name(name).is_ok() && self.paths.branch_ref(name).is_file()
    }

    /// Commit a branch points at; `None` for a branch without commits.
    pub fn branch_commit(&self, name: &str) -> Result<Option<String>> {
        if !self.branch_exists(name) {
            return Err(GitMapError::BranchNotFound(name.to_string()));
        }
        read_ref(&self.paths.branch_ref(name))
    }

    /// Point `name` at `commit_id`, creating the ref if needed.
    pub fn update_branch(&self, name: &str, commit_id: &str) -> Result<()> {
        validate_ref_name(name)?;
        write_ref(&self.paths.branch_ref(name), Some(commit_id))
    }

    /// Create a branch at `commit_id`, or at HEAD's commit.
    pub fn create_branch(&self, name: &str, commit_id: Option<&str>) -> Result<Branch> {
        validate_ref_name(name)?;
        if self.branch_exists(name) {
            return Err(GitMapError::BranchExists(name.to_string()));
        }
        let target = match commit_id {
            Some(id) => Some(self.commit(id)?.id),
            None => self.head_commit_id()?,
        };
        write_ref(&self.paths.branch_ref(name), target.as_deref())?;

        self.record_event(
            event_type::BRANCH,
            Some(name),
            json!({"action": "create", "branch": name, "commit_id": target}),
        );
        Ok(Branch {
            name: name.to_string(),
            commit_id: target,
        })
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        if !self.branch_exists(name) {
            return Err(GitMapError::BranchNotFound(name.to_string()));
        }
        if self.current_branch()?.as_deref() == Some(name) {
            return Err(GitMapError::DeleteCurrentBranch(name.to_string()));
        }
        let last = read_ref(&self.paths.branch_ref(name))?;
        remove_ref(&self.paths.branch_ref(name), &self.paths.heads_dir)?;

        self.record_event(
            event_type::BRANCH,
            Some(name),
            json!({"action": "delete", "branch": name, "commit_id": last}),
        );
        Ok(())
    }

    /// Attach HEAD to `name` and replace the index with its snapshot.
    ///
    /// Uncommitted index changes are discarded.
    pub fn checkout_branch(&self, name: &str) -> Result<Branch> {
        let target = self.branch_commit(name)?;
        let snapshot = match &target {
            Some(id) => self.commit(id)?.map_data,
            None => Document::new(),
        };
        let from = self.head()?;

        self.write_head(&Head::Branch(name.to_string()))?;
        self.update_index(&snapshot)?;

        self.record_event(
            event_type::CHECKOUT,
            Some(name),
            json!({"branch": name, "commit_id": target, "from": head_label(&from)}),
        );
        Ok(Branch {
            name: name.to_string(),
            commit_id: target,
        })
    }

    /// Detach HEAD at `id` and replace the index with that snapshot.
    pub fn checkout_commit(&self, id: &str) -> Result<Commit> {
        let commit = self.commit(id)?;
        let from = self.head()?;

        self.write_head(&Head::Detached(commit.id.clone()))?;
        self.update_index(&commit.map_data)?;

        self.record_event(
            event_type::CHECKOUT,
            Some(&commit.id),
            json!({"commit_id": commit.id, "detached": true, "from": head_label(&from)}),
        );
        Ok(commit)
    }

    // ── Index ───────────────────────────────────────────────────────

    /// The staged document. Missing or unreadable index reads as empty.
    pub fn index(&self) -> Result<Document> {
        let path = &self.paths.index_json;
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(GitMapError::io(path)(e)),
        };
        match serde_json::from_slice::<Document>(&raw) {
            Ok(doc) => Ok(doc),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "index is unreadable, treating as empty");
                Ok(Document::new())
            }
        }
    }

    pub fn update_index(&self, doc: &Document) -> Result<()> {
        write_json(&self.paths.index_json, doc)
    }

    // ── Commits ─────────────────────────────────────────────────────

    /// Load a commit object. `None` if no such commit exists.
    pub fn get_commit(&self, id: &str) -> Result<Option<Commit>> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(None);
        }
        let path = self.paths.commit_object(id);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path, "commit").map(Some)
    }

    /// Like [`get_commit`](Self::get_commit) but a missing commit is an error.
    pub fn commit(&self, id: &str) -> Result<Commit> {
        self.get_commit(id)?
            .ok_or_else(|| GitMapError::CommitNotFound(id.to_string()))
    }

    /// Commit the index on top of HEAD.
    ///
    /// The current branch advances to the new commit; a detached HEAD is left
    /// where it is. A `rationale` is stored with the commit event.
    pub fn create_commit(
        &self,
        message: &str,
        author: Option<&str>,
        rationale: Option<&str>,
    ) -> Result<Commit> {
        let commit = self.write_commit(NewCommit {
            message,
            author,
            parent: self.head_commit_id()?,
            parent2: None,
            map_data: self.index()?,
        })?;
        self.record_commit_event(event_type::COMMIT, &commit, rationale, json!({}));
        Ok(commit)
    }

    /// Persist a commit object and advance the current branch to it.
    ///
    /// An existing object with the same id is kept as is.
    pub(crate) fn write_commit(&self, new: NewCommit<'_>) -> Result<Commit> {
        let id = commit_id(new.message, &new.map_data, new.parent.as_deref());
        let path = self.paths.commit_object(&id);

        let commit = if path.is_file() {
            tracing::debug!(commit = %id, "commit object already exists, keeping it");
            read_json(&path, "commit")?
        } else {
            let author = match new.author {
                Some(a) => a.to_string(),
                None => self.config()?.author().to_string(),
            };
            let commit = Commit {
                id,
                message: new.message.to_string(),
                author,
                timestamp: now_timestamp()?,
                parent: new.parent,
                parent2: new.parent2,
                map_data: new.map_data,
            };
            write_json(&path, &commit)?;
            commit
        };

        if let Some(branch) = self.current_branch()? {
            self.update_branch(&branch, &commit.id)?;
        }
        Ok(commit)
    }

    /// First-parent history from `start` (default HEAD), newest first.
    pub fn history(&self, start: Option<&str>, limit: Option<usize>) -> Result<Vec<Commit>> {
        let mut next = match start {
            Some(id) => Some(id.to_string()),
            None => self.head_commit_id()?,
        };
        let limit = limit.unwrap_or(usize::MAX);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        while let Some(id) = next {
            if out.len() >= limit || !seen.insert(id.clone()) {
                break;
            }
            let commit = self.commit(&id)?;
            next = commit.parent.clone();
            out.push(commit);
        }
        Ok(out)
    }

    /// Nearest commit reachable from both `a` and `b` through either parent.
    pub fn find_common_ancestor(&self, a: &str, b: &str) -> Result<Option<String>> {
        let ours = self.ancestors(a)?;
        let mut queue = VecDeque::from([b.to_string()]);
        let mut seen = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if ours.contains(&id) {
                return Ok(Some(id));
            }
            if let Some(commit) = self.get_commit(&id)? {
                queue.extend(commit.parent);
                queue.extend(commit.parent2);
            }
        }
        Ok(None)
    }

    /// `start` and every commit reachable from it.
    fn ancestors(&self, start: &str) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(commit) = self.get_commit(&id)? {
                queue.extend(commit.parent);
                queue.extend(commit.parent2);
            }
        }
        Ok(seen)
    }

    // ── Working state ───────────────────────────────────────────────

    /// The index differs from HEAD's snapshot (or is non-empty before the first commit).
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let index = self.index()?;
        Ok(match self.head_commit()? {
            Some(head) => index != head.map_data,
            None => !index.is_empty(),
        })
    }

    /// Structural diff of the index against HEAD's snapshot.
    pub fn status(&self) -> Result<MapDiff> {
        Ok(diff_maps(&self.index()?, &self.head_document()?))
    }

    /// Open the context store, mapping its failure into the repository error type.
    pub fn context_store(&self) -> Result<ContextStore> {
        ContextStore::open(&self.paths.context_db)
            .map_err(|e| GitMapError::Context(format!("{e:#}")))
    }
}

fn head_label(head: &Head) -> String {
    match head {
        Head::Branch(name) => name.clone(),
        Head::Detached(id) => id.clone(),
    }
}
