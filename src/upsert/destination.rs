use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BranchRef, LabelSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    PullRequest,
    Issue,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PullRequest => "pull request",
            Self::Issue => "issue",
        }
    }
}

/// A pull request or issue already present on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingObject {
    pub number: u64,
    pub kind: ObjectKind,
    pub body: String,
    pub open: bool,
    pub merged: bool,
}

/// Result of a find-or-create call.
///
/// "Already exists" is an expected outcome on rerun, so it is data here
/// rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    Created(T),
    AlreadyExists(T),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDraft {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

/// Write side of the migration: the platform receiving recreated objects.
///
/// `repo` is always the destination's full repository name (`owner/name`).
/// Issue-level operations (labels, milestone, comments, close) accept pull
/// request numbers too, as pull requests are issues on the destination.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn default_branch(&self, repo: &str) -> Result<String>;

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool>;

    async fn commit_exists(&self, repo: &str, sha: &str) -> Result<bool>;

    async fn create_branch(&self, repo: &str, branch: &BranchRef) -> Result<Upsert<()>>;

    /// Every object of `kind`, open or closed.
    async fn list_objects(&self, repo: &str, kind: ObjectKind) -> Result<Vec<ExistingObject>>;

    async fn create_pull_request(&self, repo: &str, draft: &PullRequestDraft) -> Result<u64>;

    async fn create_issue(&self, repo: &str, draft: &IssueDraft) -> Result<u64>;

    async fn ensure_label(&self, repo: &str, label: &LabelSpec) -> Result<Upsert<()>>;

    async fn find_milestone(&self, repo: &str, title: &str) -> Result<Option<u64>>;

    async fn create_milestone(&self, repo: &str, title: &str) -> Result<u64>;

    async fn set_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<()>;

    async fn set_milestone(&self, repo: &str, number: u64, milestone: u64) -> Result<()>;

    async fn comment_bodies(&self, repo: &str, number: u64) -> Result<Vec<String>>;

    async fn add_comment(&self, repo: &str, number: u64, body: &str) -> Result<()>;

    async fn close(&self, repo: &str, number: u64) -> Result<()>;

    /// Returns `false` when the destination refuses the merge.
    async fn merge_pull_request(&self, repo: &str, number: u64, message: &str) -> Result<bool>;
}
