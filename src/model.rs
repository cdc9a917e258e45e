use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexSet;
use serde::Serialize;

/// A source repository discovered during the tree walk.
///
/// Read-only after discovery; used as the key for every downstream operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: u64,
    pub name: String,
    pub path: String,
    /// Ancestor path segments below the root group joined with "/"
    pub full_path: String,
    /// Namespaced path as reported by the source, including the root group
    pub path_with_namespace: Option<String>,
    pub archived: bool,
    pub clone_url: Option<String>,
}

impl Resource {
    pub fn display_path(&self) -> &str {
        self.path_with_namespace.as_deref().unwrap_or(&self.full_path)
    }

    /// Destination repository name; the destination has no nested namespaces.
    pub fn flattened_name(&self) -> String {
        self.full_path.replace('/', "__")
    }
}

/// A group or subgroup; only lives for the duration of the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Open,
    Closed,
    Merged,
}

impl RecordState {
    /// Merged wins over the raw state label; "closed" maps to closed, anything else is open.
    pub fn from_source(state: &str, merged_at: Option<&DateTime<Utc>>) -> Self {
        if merged_at.is_some() || state == "merged" {
            Self::Merged
        } else if state == "closed" {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

/// Immutable snapshot of a merge request or issue taken at export time.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// Per-project sequence number; not globally unique
    pub iid: u64,
    pub title: String,
    pub author: Option<String>,
    pub state: RecordState,
    /// State label exactly as the source reported it
    pub source_state: String,
    pub created_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub body: String,
    pub labels: IndexSet<String>,
    pub milestone: Option<String>,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    pub head_sha: Option<String>,
    pub assignee: Option<String>,
    pub web_url: Option<String>,
}

/// A comment/note attached to a change record.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: u64,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub body: String,
    /// Generated by the platform (state changes, pushes), not written by a person
    pub system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    /// Six hex digits without a leading '#'
    pub color: Option<String>,
}

impl LabelSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }
}

/// A destination branch created on demand for a pull-request head; never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub target_sha: String,
}

/// Optional `[since, until]` bounds applied to source listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Query parameters for an endpoint that names its bounds `after_key`/`before_key`.
    pub fn params(&self, after_key: &str, before_key: &str) -> Vec<(String, String)> {
        [(after_key, self.since), (before_key, self.until)]
            .into_iter()
            .filter_map(|(key, bound)| {
                bound.map(|t| (key.to_string(), t.to_rfc3339_opts(SecondsFormat::Secs, true)))
            })
            .collect()
    }
}

/// Render an optional timestamp the way GitLab prints them.
pub fn format_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
