use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{ChangeRecord, LabelSpec, NoteRecord};
use crate::tree::GroupSource;

/// Read side of the migration: the platform records are copied from.
///
/// Listings are lazy streams so that a failing page surfaces as an item-level
/// error at the point the orchestrator reaches it.
#[async_trait]
pub trait Source: GroupSource {
    /// Merge requests of a project in creation order.
    fn merge_requests(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>>;

    /// Head commit of a merge request from its detail view.
    async fn merge_request_head_sha(&self, project_id: u64, iid: u64) -> Result<Option<String>>;

    async fn merge_request_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>>;

    /// Issues of a project in iid order.
    fn issues(&self, project_id: u64) -> BoxStream<'_, Result<ChangeRecord>>;

    async fn issue_notes(&self, project_id: u64, iid: u64) -> Result<Vec<NoteRecord>>;

    async fn labels(&self, project_id: u64) -> Result<Vec<LabelSpec>>;
}
