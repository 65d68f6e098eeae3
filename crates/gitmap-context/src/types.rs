use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Event types written by the repository.
pub mod event_type {
    pub const COMMIT: &str = "commit";
    pub const REVERT: &str = "revert";
    pub const CHERRY_PICK: &str = "cherry_pick";
    pub const MERGE: &str = "merge";
    pub const BRANCH: &str = "branch";
    pub const CHECKOUT: &str = "checkout";
    pub const TAG: &str = "tag";
    pub const STASH: &str = "stash";
    pub const PUSH: &str = "push";
    pub const PULL: &str = "pull";
}

/// Something that happened in a repository. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: String,
    pub event_type: String,
    pub actor: Option<String>,
    pub repo: String,
    /// Commit id, branch or tag the event is about.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    Rationale,
    Lesson,
    Outcome,
    Issue,
}

impl AnnotationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rationale => "rationale",
            Self::Lesson => "lesson",
            Self::Outcome => "outcome",
            Self::Issue => "issue",
        }
    }
}

impl FromStr for AnnotationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "rationale" => Ok(Self::Rationale),
            "lesson" => Ok(Self::Lesson),
            "outcome" => Ok(Self::Outcome),
            "issue" => Ok(Self::Issue),
            other => anyhow::bail!("unknown annotation type: {other}"),
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    CausedBy,
    Reverts,
    RelatedTo,
    LearnedFrom,
    CherryPickedFrom,
}

impl Relationship {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CausedBy => "caused_by",
            Self::Reverts => "reverts",
            Self::RelatedTo => "related_to",
            Self::LearnedFrom => "learned_from",
            Self::CherryPickedFrom => "cherry_picked_from",
        }
    }
}

impl FromStr for Relationship {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "caused_by" => Ok(Self::CausedBy),
            "reverts" => Ok(Self::Reverts),
            "related_to" => Ok(Self::RelatedTo),
            "learned_from" => Ok(Self::LearnedFrom),
            "cherry_picked_from" => Ok(Self::CherryPickedFrom),
            other => anyhow::bail!("unknown relationship: {other}"),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free text attached to an event, or standalone when `event_id` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub event_id: Option<String>,
    pub annotation_type: AnnotationType,
    pub content: String,
    pub source: String,
    pub timestamp: String,
}

/// Directed link between two events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relationship: Relationship,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
}

/// Parameters for [`ContextStore::record_event`](crate::ContextStore::record_event).
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub event_type: &'a str,
    pub repo: &'a str,
    pub payload: Value,
    pub actor: Option<&'a str>,
    pub reference: Option<&'a str>,
    /// Stored as a `rationale` annotation on the new event.
    pub rationale: Option<&'a str>,
}

impl<'a> NewEvent<'a> {
    pub fn new(event_type: &'a str, repo: &'a str, payload: Value) -> Self {
        Self {
            event_type,
            repo,
            payload,
            actor: None,
            reference: None,
            rationale: None,
        }
    }
}

/// Substring search over payloads and annotation text.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    /// Empty means every type.
    pub event_types: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            event_types: Vec::new(),
            start: None,
            end: None,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub reference: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub include_annotations: bool,
    pub limit: usize,
}

impl Default for TimelineQuery {
    fn default() -> Self {
        Self {
            reference: None,
            start: None,
            end: None,
            include_annotations: true,
            limit: 100,
        }
    }
}
