//! In-memory destination for engine and orchestrator tests.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::sync::Mutex;

use super::destination::{
    Destination, ExistingObject, IssueDraft, ObjectKind, PullRequestDraft, Upsert,
};
use crate::error::{MigrateError, Result};
use crate::model::{BranchRef, ChangeRecord, LabelSpec, RecordState};

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub number: u64,
    pub kind: ObjectKind,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<u64>,
    pub open: bool,
    pub merged: bool,
    pub comments: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    default_branch: String,
    branches: IndexMap<String, String>,
    commits: HashSet<String>,
    labels: IndexSet<String>,
    milestones: IndexMap<String, u64>,
    objects: IndexMap<u64, FakeObject>,
    failing_titles: HashSet<String>,
    refuse_merges: bool,
    mutations: Vec<String>,
}

pub struct FakeDestination {
    state: Mutex<State>,
}

impl FakeDestination {
    pub fn with_branches(branches: &[&str]) -> Self {
        let state = State {
            default_branch: "main".to_string(),
            branches: branches
                .iter()
                .map(|b| (b.to_string(), String::new()))
                .collect(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_default_branch(&self, branch: &str) {
        self.with_state(|s| s.default_branch = branch.to_string());
    }

    pub fn add_commit(&self, sha: &str) {
        self.with_state(|s| s.commits.insert(sha.to_string()));
    }

    pub fn add_label(&self, name: &str) {
        self.with_state(|s| s.labels.insert(name.to_string()));
    }

    /// Pull requests and issues with this title fail with a server error.
    pub fn fail_title(&self, title: &str) {
        self.with_state(|s| s.failing_titles.insert(title.to_string()));
    }

    pub fn clear_failures(&self) {
        self.with_state(|s| s.failing_titles.clear());
    }

    pub fn refuse_merges(&self) {
        self.with_state(|s| s.refuse_merges = true);
    }

    pub fn mutations(&self) -> Vec<String> {
        self.with_state(|s| s.mutations.clone())
    }

    pub fn mutation_count(&self) -> usize {
        self.with_state(|s| s.mutations.len())
    }

    pub fn object(&self, number: u64) -> Option<FakeObject> {
        self.with_state(|s| s.objects.get(&number).cloned())
    }

    pub fn object_body(&self, number: u64) -> Option<String> {
        self.object(number).map(|o| o.body)
    }

    pub fn comments(&self, number: u64) -> Vec<String> {
        self.object(number).map(|o| o.comments).unwrap_or_default()
    }

    fn count(&self, kind: ObjectKind) -> usize {
        self.with_state(|s| s.objects.values().filter(|o| o.kind == kind).count())
    }

    pub fn pull_count(&self) -> usize {
        self.count(ObjectKind::PullRequest)
    }

    pub fn issue_count(&self) -> usize {
        self.count(ObjectKind::Issue)
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.with_state(|s| s.labels.contains(name))
    }

    pub fn milestone_number(&self, title: &str) -> Option<u64> {
        self.with_state(|s| s.milestones.get(title).copied())
    }

    pub fn branch_target(&self, branch: &str) -> Option<String> {
        self.with_state(|s| s.branches.get(branch).cloned())
    }

    fn insert_object(&self, kind: ObjectKind, title: &str, body: &str) -> Result<u64> {
        self.with_state(|s| {
            if s.failing_titles.contains(title) {
                return Err(MigrateError::Upstream {
                    status: 500,
                    body: "Internal Server Error".to_string(),
                });
            }
            let number = s.objects.len() as u64 + 1;
            s.objects.insert(
                number,
                FakeObject {
                    number,
                    kind,
                    title: title.to_string(),
                    body: body.to_string(),
                    labels: Vec::new(),
                    assignees: Vec::new(),
                    milestone: None,
                    open: true,
                    merged: false,
                    comments: Vec::new(),
                },
            );
            s.mutations.push(format!("create {} #{number}", kind.as_str()));
            Ok(number)
        })
    }

    fn update_object(&self, number: u64, action: String, f: impl FnOnce(&mut FakeObject)) -> Result<()> {
        self.with_state(|s| {
            let object = s.objects.get_mut(&number).ok_or(MigrateError::Upstream {
                status: 404,
                body: "Not Found".to_string(),
            })?;
            f(object);
            s.mutations.push(action);
            Ok(())
        })
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn default_branch(&self, _repo: &str) -> Result<String> {
        Ok(self.with_state(|s| s.default_branch.clone()))
    }

    async fn branch_exists(&self, _repo: &str, branch: &str) -> Result<bool> {
        Ok(self.with_state(|s| s.branches.contains_key(branch)))
    }

    async fn commit_exists(&self, _repo: &str, sha: &str) -> Result<bool> {
        Ok(self.with_state(|s| s.commits.contains(sha)))
    }

    async fn create_branch(&self, _repo: &str, branch: &BranchRef) -> Result<Upsert<()>> {
        Ok(self.with_state(|s| {
            if s.branches.contains_key(&branch.name) {
                return Upsert::AlreadyExists(());
            }
            s.branches
                .insert(branch.name.clone(), branch.target_sha.clone());
            s.mutations.push(format!("branch {}", branch.name));
            Upsert::Created(())
        }))
    }

    async fn list_objects(&self, _repo: &str, kind: ObjectKind) -> Result<Vec<ExistingObject>> {
        Ok(self.with_state(|s| {
            s.objects
                .values()
                .filter(|o| o.kind == kind)
                .map(|o| ExistingObject {
                    number: o.number,
                    kind: o.kind,
                    body: o.body.clone(),
                    open: o.open,
                    merged: o.merged,
                })
                .collect()
        }))
    }

    async fn create_pull_request(&self, _repo: &str, draft: &PullRequestDraft) -> Result<u64> {
        if draft.head == draft.base {
            return Err(MigrateError::Upstream {
                status: 422,
                body: format!(
                    r#"{{"message":"Validation Failed","errors":[{{"message":"No commits between {} and {}"}}]}}"#,
                    draft.base, draft.head
                ),
            });
        }
        self.insert_object(ObjectKind::PullRequest, &draft.title, &draft.body)
    }

    async fn create_issue(&self, _repo: &str, draft: &IssueDraft) -> Result<u64> {
        let number = self.insert_object(ObjectKind::Issue, &draft.title, &draft.body)?;
        self.with_state(|s| {
            if let Some(issue) = s.objects.get_mut(&number) {
                issue.labels = draft.labels.clone();
                issue.assignees = draft.assignees.clone();
            }
        });
        Ok(number)
    }

    async fn ensure_label(&self, _repo: &str, label: &LabelSpec) -> Result<Upsert<()>> {
        Ok(self.with_state(|s| {
            if s.labels.insert(label.name.clone()) {
                s.mutations.push(format!("label {}", label.name));
                Upsert::Created(())
            } else {
                Upsert::AlreadyExists(())
            }
        }))
    }

    async fn find_milestone(&self, _repo: &str, title: &str) -> Result<Option<u64>> {
        Ok(self.milestone_number(title))
    }

    async fn create_milestone(&self, _repo: &str, title: &str) -> Result<u64> {
        Ok(self.with_state(|s| {
            let number = s.milestones.len() as u64 + 1;
            s.milestones.insert(title.to_string(), number);
            s.mutations.push(format!("milestone {title}"));
            number
        }))
    }

    async fn set_labels(&self, _repo: &str, number: u64, labels: &[String]) -> Result<()> {
        self.update_object(number, format!("set-labels #{number}"), |o| {
            o.labels = labels.to_vec();
        })
    }

    async fn set_milestone(&self, _repo: &str, number: u64, milestone: u64) -> Result<()> {
        self.update_object(number, format!("set-milestone #{number}"), |o| {
            o.milestone = Some(milestone);
        })
    }

    async fn comment_bodies(&self, _repo: &str, number: u64) -> Result<Vec<String>> {
        Ok(self.comments(number))
    }

    async fn add_comment(&self, _repo: &str, number: u64, body: &str) -> Result<()> {
        self.update_object(number, format!("comment #{number}"), |o| {
            o.comments.push(body.to_string());
        })
    }

    async fn close(&self, _repo: &str, number: u64) -> Result<()> {
        self.update_object(number, format!("close #{number}"), |o| o.open = false)
    }

    async fn merge_pull_request(&self, _repo: &str, number: u64, _message: &str) -> Result<bool> {
        if self.with_state(|s| s.refuse_merges) {
            return Ok(false);
        }
        self.update_object(number, format!("merge #{number}"), |o| {
            o.open = false;
            o.merged = true;
        })?;
        Ok(true)
    }
}

/// An open merge request from `feature/login` into `main` by `alice`.
pub fn sample_record(iid: u64, title: &str) -> ChangeRecord {
    ChangeRecord {
        iid,
        title: title.to_string(),
        author: Some("alice".to_string()),
        state: RecordState::Open,
        source_state: "opened".to_string(),
        created_at: None,
        merged_at: None,
        body: "Implements the login form.".to_string(),
        labels: IndexSet::new(),
        milestone: None,
        source_branch: Some("feature/login".to_string()),
        target_branch: Some("main".to_string()),
        head_sha: None,
        assignee: None,
        web_url: Some(format!("https://gitlab.example.com/acme/api/-/merge_requests/{iid}")),
    }
}
