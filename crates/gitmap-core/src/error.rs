use std::path::PathBuf;

/// Every failure a gitmap repository operation can surface to its caller.
///
/// Merge conflicts are not errors: they come back inside a
/// [`MergeResult`](crate::merge::MergeResult) with `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum GitMapError {
    #[error("gitmap repository already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not a gitmap repository ({} not found)", .0.display())]
    NotARepository(PathBuf),

    #[error("branch '{0}' does not exist")]
    BranchNotFound(String),

    #[error("branch '{0}' already exists")]
    BranchExists(String),

    #[error("cannot delete current branch '{0}'")]
    DeleteCurrentBranch(String),

    #[error("invalid ref name {0:?}: empty, `.` or `..` segment, or control character")]
    InvalidRefName(String),

    #[error("commit '{0}' not found")]
    CommitNotFound(String),

    #[error("no commits yet")]
    NoCommits,

    #[error("HEAD is detached; checkout a branch first")]
    DetachedHead,

    #[error("cannot merge branch '{0}' into itself")]
    MergeIntoSelf(String),

    #[error("branch '{0}' has no commits")]
    EmptyBranch(String),

    #[error("merge still has {0} unresolved conflict(s)")]
    UnresolvedConflicts(usize),

    #[error("tag '{0}' does not exist")]
    TagNotFound(String),

    #[error("tag '{0}' already exists")]
    TagExists(String),

    #[error("invalid tag name {0:?}")]
    InvalidTagName(String),

    #[error("no changes to stash")]
    NothingToStash,

    #[error("no stash entries")]
    StashEmpty,

    #[error("invalid stash index {index} (stash has {len} entries)")]
    StashIndexOutOfRange { index: usize, len: usize },

    #[error("conflict on '{0}' has no base version")]
    NoBaseVersion(String),

    #[error("invalid resolution strategy: {0} (expected ours, theirs or base)")]
    InvalidStrategy(String),

    #[error("remote sync failed: {0}")]
    Remote(String),

    #[error("cannot format timestamp: {0}")]
    Timestamp(String),

    #[error("context store: {0}")]
    Context(String),

    #[error("corrupt {what} at {}: {source}", path.display())]
    Corrupt {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GitMapError {
    /// Build a `map_err` adapter that tags an I/O error with the path involved.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, GitMapError>;
