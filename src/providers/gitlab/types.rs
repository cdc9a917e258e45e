//! GitLab REST v4 payloads.
//!
//! Timestamps are kept as the raw strings GitLab sends so exports reproduce
//! them verbatim; conversion into the domain model parses them.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{ChangeRecord, GroupNode, LabelSpec, NoteRecord, RecordState, Resource};

const DEFAULT_LABEL_COLOR: &str = "ededed";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlUserRef {
    pub username: Option<String>,
    pub name: Option<String>,
}

impl GlUserRef {
    /// Username, else display name.
    pub fn identity(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
    }
}

fn identity_of(user: Option<&GlUserRef>) -> Option<String> {
    user.and_then(GlUserRef::identity).map(str::to_string)
}

fn username_of(user: Option<&GlUserRef>) -> String {
    user.and_then(|u| u.username.clone()).unwrap_or_default()
}

fn name_of(user: Option<&GlUserRef>) -> String {
    user.and_then(|u| u.name.clone()).unwrap_or_default()
}

/// Parse a GitLab timestamp; unparseable values are treated as absent.
pub fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlGroup {
    pub id: u64,
    pub path: String,
}

impl From<GlGroup> for GroupNode {
    fn from(group: GlGroup) -> Self {
        Self {
            id: group.id,
            path: group.path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlProject {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub ssh_url_to_repo: Option<String>,
}

impl From<GlProject> for Resource {
    fn from(project: GlProject) -> Self {
        Self {
            id: project.id,
            name: project.name,
            path: project.path,
            full_path: String::new(),
            path_with_namespace: project.path_with_namespace,
            archived: project.archived,
            clone_url: project.ssh_url_to_repo,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlMilestone {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlDiffRefs {
    pub head_sha: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlMergeRequest {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub author: Option<GlUserRef>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub merged_at: Option<String>,
    pub closed_at: Option<String>,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub milestone: Option<GlMilestone>,
    pub sha: Option<String>,
    pub diff_refs: Option<GlDiffRefs>,
    pub merged_by: Option<GlUserRef>,
    #[serde(default)]
    pub assignees: Vec<GlUserRef>,
    #[serde(default)]
    pub reviewers: Vec<GlUserRef>,
    pub web_url: Option<String>,
}

impl GlMergeRequest {
    /// `diff_refs.head_sha`, else `sha`.
    pub fn head_sha(&self) -> Option<String> {
        self.diff_refs
            .as_ref()
            .and_then(|d| d.head_sha.clone())
            .or_else(|| self.sha.clone())
            .filter(|s| !s.is_empty())
    }

    pub fn into_record(self) -> ChangeRecord {
        let merged_at = parse_time(self.merged_at.as_deref());
        ChangeRecord {
            iid: self.iid,
            author: identity_of(self.author.as_ref()),
            state: RecordState::from_source(&self.state, merged_at.as_ref()),
            created_at: parse_time(self.created_at.as_deref()),
            merged_at,
            body: self.description.unwrap_or_default(),
            labels: self.labels.into_iter().collect(),
            milestone: self.milestone.map(|m| m.title),
            head_sha: self
                .diff_refs
                .and_then(|d| d.head_sha)
                .or(self.sha)
                .filter(|s| !s.is_empty()),
            assignee: self.assignees.first().and_then(|a| a.username.clone()),
            source_state: self.state,
            title: self.title,
            source_branch: self.source_branch.filter(|b| !b.is_empty()),
            target_branch: self.target_branch.filter(|b| !b.is_empty()),
            web_url: self.web_url,
        }
    }

    pub fn export_row(&self, prefix: &[String]) -> Vec<String> {
        let mut row = prefix.to_vec();
        row.extend([
            self.iid.to_string(),
            self.id.to_string(),
            self.title.clone(),
            self.state.clone(),
            self.source_branch.clone().unwrap_or_default(),
            self.target_branch.clone().unwrap_or_default(),
            username_of(self.author.as_ref()),
            name_of(self.author.as_ref()),
            self.created_at.clone().unwrap_or_default(),
            self.updated_at.clone().unwrap_or_default(),
            self.merged_at.clone().unwrap_or_default(),
            self.closed_at.clone().unwrap_or_default(),
            username_of(self.merged_by.as_ref()),
            join_usernames(&self.assignees),
            join_usernames(&self.reviewers),
            self.labels.join(","),
            self.milestone
                .as_ref()
                .map(|m| m.title.clone())
                .unwrap_or_default(),
            self.web_url.clone().unwrap_or_default(),
        ]);
        row
    }
}

fn join_usernames(users: &[GlUserRef]) -> String {
    users
        .iter()
        .map(|u| u.username.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlIssue {
    pub iid: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub author: Option<GlUserRef>,
    pub assignee: Option<GlUserRef>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub milestone: Option<GlMilestone>,
    pub web_url: Option<String>,
}

impl GlIssue {
    pub fn into_record(self) -> ChangeRecord {
        ChangeRecord {
            iid: self.iid,
            author: identity_of(self.author.as_ref()),
            state: RecordState::from_source(&self.state, None),
            created_at: parse_time(self.created_at.as_deref()),
            merged_at: None,
            body: self.description.unwrap_or_default(),
            labels: self.labels.into_iter().collect(),
            milestone: self.milestone.map(|m| m.title),
            source_branch: None,
            target_branch: None,
            head_sha: None,
            assignee: self.assignee.and_then(|a| a.username),
            source_state: self.state,
            title: self.title,
            web_url: self.web_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlNote {
    pub id: u64,
    pub body: Option<String>,
    pub author: Option<GlUserRef>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub system: bool,
}

impl From<GlNote> for NoteRecord {
    fn from(note: GlNote) -> Self {
        Self {
            id: note.id,
            author: identity_of(note.author.as_ref()),
            created_at: parse_time(note.created_at.as_deref()),
            body: note.body.unwrap_or_default(),
            system: note.system,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlLabel {
    pub name: String,
    pub color: Option<String>,
}

impl From<GlLabel> for LabelSpec {
    fn from(label: GlLabel) -> Self {
        let color: String = label
            .color
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('#')
            .chars()
            .take(6)
            .collect();
        Self {
            name: label.name,
            color: Some(if color.is_empty() {
                DEFAULT_LABEL_COLOR.to_string()
            } else {
                color
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlPipeline {
    pub id: u64,
    pub iid: Option<u64>,
    pub status: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub sha: Option<String>,
    pub web_url: Option<String>,
    pub duration: Option<f64>,
    pub queued_duration: Option<f64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub user: Option<GlUserRef>,
}

impl GlPipeline {
    /// List fields come from `self`, timing and user from `detail`.
    pub fn export_row(&self, detail: &GlPipeline, prefix: &[String]) -> Vec<String> {
        let mut row = prefix.to_vec();
        row.extend([
            self.id.to_string(),
            display(&self.iid),
            self.status.clone().unwrap_or_default(),
            self.source.clone().unwrap_or_default(),
            self.ref_.clone().unwrap_or_default(),
            self.sha.clone().unwrap_or_default(),
            self.web_url.clone().unwrap_or_default(),
            display(&detail.duration),
            display(&detail.queued_duration),
            self.created_at.clone().unwrap_or_default(),
            self.updated_at.clone().unwrap_or_default(),
            detail.started_at.clone().unwrap_or_default(),
            detail.finished_at.clone().unwrap_or_default(),
            username_of(detail.user.as_ref()),
            name_of(detail.user.as_ref()),
        ]);
        row
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlCommitRef {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlRunner {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlJob {
    pub id: u64,
    pub name: Option<String>,
    pub stage: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub commit: Option<GlCommitRef>,
    pub runner: Option<GlRunner>,
    #[serde(default)]
    pub tag_list: Vec<String>,
    pub allow_failure: Option<bool>,
    pub duration: Option<f64>,
    pub queued_duration: Option<f64>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub user: Option<GlUserRef>,
    pub web_url: Option<String>,
}

impl GlJob {
    pub fn export_row(&self, pipeline_id: u64, prefix: &[String]) -> Vec<String> {
        let mut row = prefix.to_vec();
        row.extend([
            pipeline_id.to_string(),
            self.id.to_string(),
            self.name.clone().unwrap_or_default(),
            self.stage.clone().unwrap_or_default(),
            self.status.clone().unwrap_or_default(),
            self.ref_.clone().unwrap_or_default(),
            self.commit
                .as_ref()
                .and_then(|c| c.id.clone())
                .unwrap_or_default(),
            self.runner
                .as_ref()
                .and_then(|r| r.description.clone())
                .unwrap_or_default(),
            self.tag_list.join(","),
            display(&self.allow_failure),
            display(&self.duration),
            display(&self.queued_duration),
            self.created_at.clone().unwrap_or_default(),
            self.started_at.clone().unwrap_or_default(),
            self.finished_at.clone().unwrap_or_default(),
            username_of(self.user.as_ref()),
            name_of(self.user.as_ref()),
            self.web_url.clone().unwrap_or_default(),
        ]);
        row
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlCommit {
    pub id: String,
    pub short_id: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committed_date: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    pub web_url: Option<String>,
}

impl GlCommit {
    pub fn export_row(&self, prefix: &[String]) -> Vec<String> {
        let mut row = prefix.to_vec();
        row.extend([
            self.id.clone(),
            self.short_id.clone().unwrap_or_default(),
            self.title.clone().unwrap_or_default(),
            self.message.clone().unwrap_or_default(),
            self.author_name.clone().unwrap_or_default(),
            self.author_email.clone().unwrap_or_default(),
            self.committed_date.clone().unwrap_or_default(),
            self.created_at.clone().unwrap_or_default(),
            self.parent_ids.join(","),
            self.web_url.clone().unwrap_or_default(),
        ]);
        row
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlUser {
    pub id: u64,
    pub username: String,
    pub state: Option<String>,
    #[serde(default, alias = "is_admin")]
    pub admin: bool,
}

impl GlUser {
    /// Active accounts without administrator rights.
    pub fn is_blockable(&self) -> bool {
        !self.admin && self.state.as_deref() == Some("active")
    }
}

fn display<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}
