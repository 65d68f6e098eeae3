use crate::document::Document;
use crate::error::{GitMapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Characters of a commit id shown in messages and logs.
pub const SHORT_ID_LEN: usize = 8;

/// An immutable snapshot of the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub author: String,
    pub timestamp: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub parent2: Option<String>,
    pub map_data: Document,
}

impl Commit {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn is_merge(&self) -> bool {
        self.parent2.is_some()
    }
}

/// First characters of a commit id, for display.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// `None` until the first commit lands on the branch.
    pub commit_id: Option<String>,
}

/// Contents of `.gitmap/config.json`. Unknown keys are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Remote>,
    #[serde(default)]
    pub auto_visualize: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            user_name: String::new(),
            user_email: String::new(),
            project_name: String::new(),
            remote: None,
            auto_visualize: false,
            extra: Map::new(),
        }
    }
}

impl RepoConfig {
    /// Author recorded on commits when the caller gives none.
    pub fn author(&self) -> &str {
        if self.user_name.is_empty() {
            "Unknown"
        } else {
            &self.user_name
        }
    }
}

/// Hosted-service settings used by a remote sync implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Remote {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_branch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StashEntry {
    /// `stash@{n}`, renumbered whenever the stack changes.
    pub id: String,
    pub message: String,
    pub branch: Option<String>,
    pub timestamp: String,
    pub index_data: Document,
}

pub fn stash_id(position: usize) -> String {
    format!("stash@{{{position}}}")
}

/// Fixed-width UTC layout, so lexical order matches chronological order.
const TIMESTAMP_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z";

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn now_timestamp() -> Result<String> {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String> {
    let format = time::format_description::parse(TIMESTAMP_FORMAT)
        .map_err(|e| GitMapError::Timestamp(e.to_string()))?;
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|e| GitMapError::Timestamp(e.to_string()))
}
