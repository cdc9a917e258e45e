use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use serde_json::{json, Value};

use super::client::{create_outcome, GitHubClient};
use super::types::{GhComment, GhIssue, GhMilestone, GhNumbered, GhPullRequest, GhRepository};
use crate::error::Result;
use crate::http::{query, PageStyle};
use crate::model::{BranchRef, LabelSpec};
use crate::upsert::{
    Destination, ExistingObject, IssueDraft, ObjectKind, PullRequestDraft, Upsert,
};

const FALLBACK_DEFAULT_BRANCH: &str = "main";

impl GitHubClient {
    async fn patch_issue(&self, repo: &str, number: u64, body: Value) -> Result<()> {
        self.api
            .patch(&format!("repos/{repo}/issues/{number}"), &body)
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// 200 means present, 404 absent; anything else is an error.
    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.api.get(path).await?;
        match response.status {
            404 => Ok(false),
            _ => response.error_for_status().map(|_| true),
        }
    }
}

#[async_trait]
impl Destination for GitHubClient {
    async fn default_branch(&self, repo: &str) -> Result<String> {
        let repository: GhRepository = self.api.get_json(&format!("repos/{repo}"), &[]).await?;
        Ok(repository
            .default_branch
            .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string()))
    }

    async fn branch_exists(&self, repo: &str, branch: &str) -> Result<bool> {
        self.exists(&format!("repos/{repo}/git/ref/heads/{branch}"))
            .await
    }

    async fn commit_exists(&self, repo: &str, sha: &str) -> Result<bool> {
        let response = self.api.get(&format!("repos/{repo}/git/commits/{sha}")).await?;
        Ok(response.is_success())
    }

    async fn create_branch(&self, repo: &str, branch: &BranchRef) -> Result<Upsert<()>> {
        let payload = json!({
            "ref": format!("refs/heads/{}", branch.name),
            "sha": branch.target_sha,
        });
        let response = self.api.post(&format!("repos/{repo}/git/refs"), &payload).await?;
        Ok(create_outcome(response).unwrap_or_else(|e| Upsert::Failed(e.to_string())))
    }

    async fn list_objects(&self, repo: &str, kind: ObjectKind) -> Result<Vec<ExistingObject>> {
        let state = query([("state", "all")]);
        match kind {
            ObjectKind::PullRequest => {
                self.api
                    .paginate::<GhPullRequest>(&format!("repos/{repo}/pulls"), state, PageStyle::LinkHeader)
                    .map_ok(ExistingObject::from)
                    .try_collect()
                    .await
            }
            ObjectKind::Issue => {
                self.api
                    .paginate::<GhIssue>(&format!("repos/{repo}/issues"), state, PageStyle::LinkHeader)
                    .try_filter(|issue| futures::future::ready(!issue.is_pull_request()))
                    .map_ok(ExistingObject::from)
                    .try_collect()
                    .await
            }
        }
    }

    async fn create_pull_request(&self, repo: &str, draft: &PullRequestDraft) -> Result<u64> {
        let payload = json!({
            "title": draft.title,
            "body": draft.body,
            "head": draft.head,
            "base": draft.base,
            "maintainer_can_modify": false,
        });
        let created: GhNumbered = self
            .api
            .post(&format!("repos/{repo}/pulls"), &payload)
            .await?
            .error_for_status()?
            .json()?;
        Ok(created.number)
    }

    async fn create_issue(&self, repo: &str, draft: &IssueDraft) -> Result<u64> {
        let mut payload = json!({
            "title": draft.title,
            "body": draft.body,
            "labels": draft.labels,
        });
        if !draft.assignees.is_empty() {
            payload["assignees"] = json!(draft.assignees);
        }
        let created: GhNumbered = self
            .api
            .post(&format!("repos/{repo}/issues"), &payload)
            .await?
            .error_for_status()?
            .json()?;
        Ok(created.number)
    }

    async fn ensure_label(&self, repo: &str, label: &LabelSpec) -> Result<Upsert<()>> {
        let mut payload = json!({ "name": label.name });
        if let Some(color) = &label.color {
            payload["color"] = json!(color);
        }
        let response = self.api.post(&format!("repos/{repo}/labels"), &payload).await?;
        // GitHub reports duplicate labels as 422 "already_exists"
        Ok(create_outcome(response).unwrap_or_else(|e| Upsert::Failed(e.to_string())))
    }

    async fn find_milestone(&self, repo: &str, title: &str) -> Result<Option<u64>> {
        let milestones: Vec<GhMilestone> = self
            .api
            .fetch_all(
                &format!("repos/{repo}/milestones"),
                query([("state", "all")]),
                PageStyle::LinkHeader,
            )
            .await?;
        Ok(milestones
            .into_iter()
            .find(|m| m.title == title)
            .map(|m| m.number))
    }

    async fn create_milestone(&self, repo: &str, title: &str) -> Result<u64> {
        let created: GhNumbered = self
            .api
            .post(&format!("repos/{repo}/milestones"), &json!({ "title": title }))
            .await?
            .error_for_status()?
            .json()?;
        Ok(created.number)
    }

    async fn set_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<()> {
        self.patch_issue(repo, number, json!({ "labels": labels }))
            .await
    }

    async fn set_milestone(&self, repo: &str, number: u64, milestone: u64) -> Result<()> {
        self.patch_issue(repo, number, json!({ "milestone": milestone }))
            .await
    }

    async fn comment_bodies(&self, repo: &str, number: u64) -> Result<Vec<String>> {
        self.api
            .paginate::<GhComment>(
                &format!("repos/{repo}/issues/{number}/comments"),
                Vec::new(),
                PageStyle::LinkHeader,
            )
            .map_ok(|c| c.body.unwrap_or_default())
            .try_collect()
            .await
    }

    async fn add_comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        self.api
            .post(
                &format!("repos/{repo}/issues/{number}/comments"),
                &json!({ "body": body }),
            )
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&self, repo: &str, number: u64) -> Result<()> {
        self.patch_issue(repo, number, json!({ "state": "closed" }))
            .await
    }

    async fn merge_pull_request(&self, repo: &str, number: u64, message: &str) -> Result<bool> {
        let response = self
            .api
            .put(
                &format!("repos/{repo}/pulls/{number}/merge"),
                &json!({ "commit_title": message }),
            )
            .await?;
        if !response.is_success() {
            debug!(
                "Merge of {repo}#{number} refused ({}): {}",
                response.status, response.body
            );
        }
        Ok(response.is_success())
    }
}
