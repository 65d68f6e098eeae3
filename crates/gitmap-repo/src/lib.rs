pub mod branch_merge;
pub mod fsio;
pub mod paths;
mod provenance;
pub mod remote;
mod replay;
pub mod repository;
mod stash;
mod tags;

pub use branch_merge::MergeOutcome;
pub use paths::GitMapPaths;
pub use remote::{PushReceipt, RemoteSync, DEFAULT_REMOTE};
pub use repository::{Head, Repository, DEFAULT_BRANCH};
