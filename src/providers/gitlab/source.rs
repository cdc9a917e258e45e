use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};

use super::client::GitLabClient;
use super::types::{GlIssue, GlMergeRequest};
use crate::error::Result;
use crate::model::{ChangeRecord, GroupNode, LabelSpec, NoteRecord, Resource, TimeWindow};
use crate::source::Source;
use crate::tree::GroupSource;

#[async_trait]
impl GroupSource for GitLabClient {
    async fn subgroups(&self, group_id: u64) -> Result<Vec<GroupNode>> {
        self.subgroup_list(group_id)
            .map_ok(GroupNode::from)
            .try_collect()
            .await
    }

    async fn group_projects(&self, group_id: u64, include_archived: bool) -> Result<Vec<Resource>> {
        self.project_list(group_id, include_archived)
            .map_ok(Resource::from)
            .try_collect()
            .await
    }
}

#[async_trait]
impl Source for GitLabClient {
    fn merge_requests(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>> {
        self.merge_request_list(project_id, &TimeWindow::default())
            .map_ok(GlMergeRequest::into_record)
            .boxed()
    }

    async fn merge_request_head_sha(&self, project_id: u64, iid: u64) -> Result<Option<String>> {
        Ok(self.merge_request(project_id, iid).await?.head_sha())
    }

    async fn merge_request_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>> {
        Ok(self
            .merge_request_note_list(project_id, iid)
            .await?
            .into_iter()
            .map(NoteRecord::from)
            .collect())
    }

    fn issues(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>> {
        self.issue_list(project_id)
            .map_ok(GlIssue::into_record)
            .boxed()
    }

    async fn issue_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>> {
        Ok(self
            .issue_note_list(project_id, iid)
            .await?
            .into_iter()
            .map(NoteRecord::from)
            .collect())
    }

    async fn labels(&self, project_id: u64) -> Result<Vec<LabelSpec>> {
        Ok(self
            .label_list(project_id)
            .await?
            .into_iter()
            .map(LabelSpec::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_client;
    use crate::model::RecordState;
    use crate::tree::TreeWalker;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> GitLabClient {
        GitLabClient::from_api(test_client(&format!("{}/api/v4", server.url())))
    }

    #[tokio::test]
    async fn test_walk_over_rest_api() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/groups/1/projects")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id": 10, "name": "P", "path": "p", "path_with_namespace": "g/p"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/groups/1/subgroups")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id": 2, "path": "s"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/groups/2/projects")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id": 20, "name": "Q", "path": "q", "path_with_namespace": "g/s/q"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/groups/2/subgroups")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let gitlab = client(&server);
        let discovery = TreeWalker::new(&gitlab, false).walk(1).await.unwrap();

        let paths: Vec<&str> = discovery
            .resources
            .iter()
            .map(|r| r.full_path.as_str())
            .collect();
        assert_eq!(paths, vec!["p", "s/q"]);
        assert_eq!(discovery.resources[1].display_path(), "g/s/q");
    }

    #[tokio::test]
    async fn test_merge_requests_become_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/10/merge_requests")
            .match_query(Matcher::UrlEncoded("state".into(), "all".into()))
            .with_body(
                r#"[{"id": 1, "iid": 3, "title": "Old", "state": "merged",
                     "merged_at": "2024-02-01T00:00:00Z", "source_branch": "x"},
                    {"id": 2, "iid": 4, "title": "New", "state": "opened"}]"#,
            )
            .create_async()
            .await;

        let gitlab = client(&server);
        let records: Vec<ChangeRecord> = gitlab.merge_requests(10).try_collect().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].state, RecordState::Merged);
        assert_eq!(records[1].state, RecordState::Open);
        assert_eq!(records[1].iid, 4);
    }

    #[tokio::test]
    async fn test_head_sha_from_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/10/merge_requests/3")
            .with_body(r#"{"id": 1, "iid": 3, "title": "t", "state": "opened",
                           "sha": "abcdef1", "diff_refs": {"head_sha": "1234567abc"}}"#)
            .create_async()
            .await;

        let sha = client(&server)
            .merge_request_head_sha(10, 3)
            .await
            .unwrap();
        assert_eq!(sha.as_deref(), Some("1234567abc"));
    }

    #[tokio::test]
    async fn test_issue_notes_keep_system_flag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/10/issues/2/notes")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_body(
                r#"[{"id": 5, "body": "hi", "author": {"username": "bob"}, "system": false},
                    {"id": 6, "body": "changed title", "system": true}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/10/issues/2/notes")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body("[]")
            .create_async()
            .await;

        let notes = client(&server).issue_notes(10, 2).await.unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].author.as_deref(), Some("bob"));
        assert!(notes[1].system);
    }
}
