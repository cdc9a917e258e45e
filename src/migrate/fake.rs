//! In-memory source for orchestrator tests: one root group (id 1) under the
//! `acme` namespace holding every project.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};

use crate::error::{MigrateError, Result};
use crate::model::{ChangeRecord, GroupNode, LabelSpec, NoteRecord, Resource};
use crate::source::Source;
use crate::tree::GroupSource;

pub const ROOT_GROUP: u64 = 1;

#[derive(Default)]
pub struct FakeSource {
    projects: Vec<Resource>,
    merge_requests: HashMap<u64, Vec<ChangeRecord>>,
    issues: HashMap<u64, Vec<ChangeRecord>>,
    notes: HashMap<(u64, u64), Vec<NoteRecord>>,
    labels: HashMap<u64, Vec<LabelSpec>>,
    head_shas: HashMap<(u64, u64), String>,
    broken_listings: HashSet<u64>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, id: u64, path: &str) -> Self {
        self.projects.push(Resource {
            id,
            name: path.to_string(),
            path: path.to_string(),
            full_path: String::new(),
            path_with_namespace: Some(format!("acme/{path}")),
            archived: false,
            clone_url: Some(format!("git@gitlab.example.com:acme/{path}.git")),
        });
        self
    }

    pub fn merge_request(mut self, project_id: u64, record: ChangeRecord) -> Self {
        self.merge_requests.entry(project_id).or_default().push(record);
        self
    }

    pub fn issue(mut self, project_id: u64, record: ChangeRecord) -> Self {
        self.issues.entry(project_id).or_default().push(record);
        self
    }

    pub fn note(mut self, project_id: u64, iid: u64, note: NoteRecord) -> Self {
        self.notes.entry((project_id, iid)).or_default().push(note);
        self
    }

    pub fn label(mut self, project_id: u64, name: &str, color: &str) -> Self {
        self.labels.entry(project_id).or_default().push(LabelSpec {
            name: name.to_string(),
            color: Some(color.to_string()),
        });
        self
    }

    pub fn head_sha(mut self, project_id: u64, iid: u64, sha: &str) -> Self {
        self.head_shas.insert((project_id, iid), sha.to_string());
        self
    }

    /// Listings of this project fail with a 500 on the first page.
    pub fn break_listing(mut self, project_id: u64) -> Self {
        self.broken_listings.insert(project_id);
        self
    }

    pub fn resources(&self) -> &[Resource] {
        &self.projects
    }

    fn listing(
        &self,
        project_id: u64,
        records: &HashMap<u64, Vec<ChangeRecord>>,
    ) -> BoxStream<'_, Result<ChangeRecord>> {
        if self.broken_listings.contains(&project_id) {
            return stream::iter(vec![Err(MigrateError::Upstream {
                status: 500,
                body: "Internal Server Error".to_string(),
            })])
            .boxed();
        }
        let items: Vec<Result<ChangeRecord>> = records
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Ok)
            .collect();
        stream::iter(items).boxed()
    }
}

pub fn note(id: u64, body: &str, system: bool) -> NoteRecord {
    NoteRecord {
        id,
        author: Some("bob".to_string()),
        created_at: None,
        body: body.to_string(),
        system,
    }
}

#[async_trait]
impl GroupSource for FakeSource {
    async fn subgroups(&self, _group_id: u64) -> Result<Vec<GroupNode>> {
        Ok(Vec::new())
    }

    async fn group_projects(&self, group_id: u64, include_archived: bool) -> Result<Vec<Resource>> {
        if group_id != ROOT_GROUP {
            return Ok(Vec::new());
        }
        Ok(self
            .projects
            .iter()
            .filter(|p| include_archived || !p.archived)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Source for FakeSource {
    fn merge_requests(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>> {
        self.listing(project_id, &self.merge_requests)
    }

    async fn merge_request_head_sha(&self, project_id: u64, iid: u64) -> Result<Option<String>> {
        Ok(self.head_shas.get(&(project_id, iid)).cloned())
    }

    async fn merge_request_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>> {
        Ok(self.notes.get(&(project_id, iid)).cloned().unwrap_or_default())
    }

    fn issues(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>> {
        self.listing(project_id, &self.issues)
    }

    async fn issue_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>> {
        Ok(self.notes.get(&(project_id, iid)).cloned().unwrap_or_default())
    }

    async fn labels(&self, project_id: u64) -> Result<Vec<LabelSpec>> {
        Ok(self.labels.get(&project_id).cloned().unwrap_or_default())
    }
}
