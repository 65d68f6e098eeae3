pub mod canon;
pub mod diff;
pub mod document;
pub mod error;
pub mod hash;
pub mod merge;
pub mod replay;
pub mod types;

pub use diff::{diff_maps, ChangeType, JsonDiff, LayerChange, MapDiff};
pub use document::{Collection, Document};
pub use error::{GitMapError, Result};
pub use merge::{apply_resolution, merge_maps, resolve_conflict, MergeConflict, MergeResult, Resolution};
pub use replay::{cherry_pick_changes, revert_changes};
pub use types::*;
