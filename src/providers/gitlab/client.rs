use futures::stream::BoxStream;
use log::debug;
use reqwest::Method;

use super::types::{
    GlCommit, GlGroup, GlIssue, GlJob, GlLabel, GlMergeRequest, GlNote, GlPipeline, GlProject,
    GlUser,
};
use crate::error::Result;
use crate::http::{query, ApiClient, Auth, PageStyle, RetryPolicy};
use crate::model::TimeWindow;

/// GitLab REST v4 client.
///
/// `api_url` is the versioned API root, e.g. `https://gitlab.example.com/api/v4`.
pub struct GitLabClient {
    api: ApiClient,
}

impl GitLabClient {
    pub fn new(api_url: &str, token: &str, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(api_url, Auth::PrivateToken(token.to_string()), retry)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn subgroup_list(&self, group_id: u64) -> BoxStream<'_, Result<GlGroup>> {
        self.api.paginate(
            &format!("groups/{group_id}/subgroups"),
            Vec::new(),
            PageStyle::LinkHeader,
        )
    }

    /// Direct child projects of a group.
    ///
    /// GitLab's `archived=true` means "only archived", so the parameter is
    /// omitted entirely when archived projects should be included.
    pub fn project_list(
        &self,
        group_id: u64,
        include_archived: bool,
    ) -> BoxStream<'_, Result<GlProject>> {
        let mut params = query([
            ("include_subgroups", "false"),
            ("with_shared", "false"),
            ("order_by", "id"),
            ("sort", "asc"),
        ]);
        if !include_archived {
            params.push(("archived".to_string(), "false".to_string()));
        }
        self.api.paginate(
            &format!("groups/{group_id}/projects"),
            params,
            PageStyle::LinkHeader,
        )
    }

    /// Look up a project by its namespaced path (`group/subgroup/repo`).
    pub async fn project_by_path(&self, path: &str) -> Result<GlProject> {
        debug!("Resolving GitLab project {path}");
        self.api
            .get_json(&format!("projects/{}", urlencoding::encode(path)), &[])
            .await
    }

    pub fn pipelines(
        &self,
        project_id: u64,
        window: &TimeWindow,
    ) -> BoxStream<'_, Result<GlPipeline>> {
        self.api.paginate(
            &format!("projects/{project_id}/pipelines"),
            window.params("updated_after", "updated_before"),
            PageStyle::LinkHeader,
        )
    }

    pub async fn pipeline(&self, project_id: u64, pipeline_id: u64) -> Result<GlPipeline> {
        self.api
            .get_json(&format!("projects/{project_id}/pipelines/{pipeline_id}"), &[])
            .await
    }

    pub fn pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> BoxStream<'_, Result<GlJob>> {
        self.api.paginate(
            &format!("projects/{project_id}/pipelines/{pipeline_id}/jobs"),
            Vec::new(),
            PageStyle::LinkHeader,
        )
    }

    pub fn commits(&self, project_id: u64, window: &TimeWindow) -> BoxStream<'_, Result<GlCommit>> {
        self.api.paginate(
            &format!("projects/{project_id}/repository/commits"),
            window.params("since", "until"),
            PageStyle::LinkHeader,
        )
    }

    /// Merge requests in any state, oldest first.
    pub fn merge_request_list(
        &self,
        project_id: u64,
        window: &TimeWindow,
    ) -> BoxStream<'_, Result<GlMergeRequest>> {
        let mut params = query([
            ("state", "all"),
            ("order_by", "created_at"),
            ("sort", "asc"),
        ]);
        params.extend(window.params("created_after", "created_before"));
        self.api.paginate(
            &format!("projects/{project_id}/merge_requests"),
            params,
            PageStyle::LinkHeader,
        )
    }

    pub async fn merge_request(&self, project_id: u64, iid: u64) -> Result<GlMergeRequest> {
        self.api
            .get_json(&format!("projects/{project_id}/merge_requests/{iid}"), &[])
            .await
    }

    pub async fn merge_request_note_list(&self, project_id: u64, iid: u64) -> Result<Vec<GlNote>> {
        self.api
            .fetch_all(
                &format!("projects/{project_id}/merge_requests/{iid}/notes"),
                query([("order_by", "created_at"), ("sort", "asc")]),
                PageStyle::LinkHeader,
            )
            .await
    }

    pub fn issue_list(&self, project_id: u64) -> BoxStream<'_, Result<GlIssue>> {
        self.api.paginate(
            &format!("projects/{project_id}/issues"),
            query([("scope", "all"), ("order_by", "iid"), ("sort", "asc")]),
            PageStyle::PageNumber,
        )
    }

    pub async fn issue_note_list(&self, project_id: u64, iid: u64) -> Result<Vec<GlNote>> {
        self.api
            .fetch_all(
                &format!("projects/{project_id}/issues/{iid}/notes"),
                query([("order_by", "created_at"), ("sort", "asc")]),
                PageStyle::PageNumber,
            )
            .await
    }

    pub async fn label_list(&self, project_id: u64) -> Result<Vec<GlLabel>> {
        self.api
            .fetch_all(
                &format!("projects/{project_id}/labels"),
                Vec::new(),
                PageStyle::PageNumber,
            )
            .await
    }

    /// Active users ordered by id.
    pub fn active_users(&self) -> BoxStream<'_, Result<GlUser>> {
        self.api.paginate(
            "users",
            query([("order_by", "id"), ("sort", "asc"), ("active", "true")]),
            PageStyle::PageNumber,
        )
    }

    pub async fn block_user(&self, user_id: u64) -> Result<()> {
        let url = self.api.endpoint(&format!("users/{user_id}/block"))?;
        self.api
            .send(Method::POST, url, &[], None)
            .await?
            .error_for_status()?;
        Ok(())
    }
}
