use serde::Deserialize;
use serde_json::Value;

use crate::upsert::{ExistingObject, ObjectKind};

#[derive(Debug, Clone, Deserialize)]
pub struct GhRepository {
    pub default_branch: Option<String>,
}

/// Response of any create call that returns an issue-like object.
#[derive(Debug, Clone, Deserialize)]
pub struct GhNumbered {
    pub number: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhPullRequest {
    pub number: u64,
    pub body: Option<String>,
    pub state: String,
    pub merged_at: Option<String>,
}

impl From<GhPullRequest> for ExistingObject {
    fn from(pull: GhPullRequest) -> Self {
        Self {
            number: pull.number,
            kind: ObjectKind::PullRequest,
            body: pull.body.unwrap_or_default(),
            open: pull.state == "open",
            merged: pull.merged_at.is_some(),
        }
    }
}

/// Issues listing entry; pull requests show up here too, flagged by `pull_request`.
#[derive(Debug, Clone, Deserialize)]
pub struct GhIssue {
    pub number: u64,
    pub body: Option<String>,
    pub state: String,
    pub pull_request: Option<Value>,
}

impl GhIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

impl From<GhIssue> for ExistingObject {
    fn from(issue: GhIssue) -> Self {
        Self {
            number: issue.number,
            kind: ObjectKind::Issue,
            body: issue.body.unwrap_or_default(),
            open: issue.state == "open",
            merged: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhMilestone {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhComment {
    pub body: Option<String>,
}
