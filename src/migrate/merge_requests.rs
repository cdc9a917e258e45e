use futures::StreamExt;
use log::{info, warn};

use super::destination_repo;
use super::report::RunReport;
use crate::error::Result;
use crate::identity::IdentityMap;
use crate::model::{ChangeRecord, Resource};
use crate::source::Source;
use crate::upsert::{Destination, EngineOptions, ImportOutcome, ImportRequest, UpsertEngine};

/// Settings shared by the merge-request and issue imports.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Destination organisation receiving `<org>/<flattened path>` repositories
    pub org: String,
    pub engine: EngineOptions,
    /// Read the source and report what would be imported, without any
    /// destination call
    pub dry_run: bool,
}

/// Recreate every merge request of every resource as a pull request.
///
/// Failures are recorded per record (or per resource when the listing
/// itself fails) and the batch moves on.
pub async fn import_merge_requests<S, D>(
    source: &S,
    destination: &D,
    identities: &IdentityMap,
    resources: &[Resource],
    settings: &ImportSettings,
    report: &mut RunReport,
) where
    S: Source + ?Sized,
    D: Destination + ?Sized,
{
    let mut engine = UpsertEngine::new(destination, identities, settings.engine.clone());

    for resource in resources {
        let repo = destination_repo(&settings.org, resource);
        let path = resource.display_path();
        info!("Importing merge requests of {path} into {repo}");

        let mut records = source.merge_requests(resource.id);
        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    report.failed(path, None, format!("merge request listing failed: {e}"));
                    break;
                }
            };

            if settings.dry_run {
                report.processed(
                    path,
                    Some(record.iid),
                    format!("dry run: would import '{}' into {repo}", record.title),
                );
                continue;
            }

            let iid = record.iid;
            match import_one(source, &mut engine, &repo, resource.id, record).await {
                Ok(ImportOutcome::Skipped { reason }) => report.skipped(path, Some(iid), reason),
                Ok(outcome) => report.processed(path, Some(iid), outcome.describe()),
                Err(e) => report.error(path, Some(iid), &e),
            }
        }
    }
}

async fn import_one<S, D>(
    source: &S,
    engine: &mut UpsertEngine<'_, D>,
    repo: &str,
    project_id: u64,
    mut record: ChangeRecord,
) -> Result<ImportOutcome>
where
    S: Source + ?Sized,
    D: Destination + ?Sized,
{
    let iid = record.iid;
    // list items carry a stale or missing head; the detail view is authoritative
    match source.merge_request_head_sha(project_id, iid).await {
        Ok(Some(sha)) => record.head_sha = Some(sha),
        Ok(None) => {}
        Err(e) => warn!("Head SHA lookup failed for MR !{iid}, using listed SHA: {e}"),
    }
    let notes = source.merge_request_notes(project_id, iid).await?;

    engine
        .import_merge_request(ImportRequest {
            repo,
            project_id,
            record: &record,
            notes: &notes,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::fake::{note, FakeSource, ROOT_GROUP};
    use crate::migrate::report::Status;
    use crate::migrate::{discover, ProjectScope};
    use crate::upsert::fake::{sample_record, FakeDestination};
    use crate::upsert::{FallbackPolicy, ObjectKind, HISTORICAL_MR_LABEL};

    fn settings(fallback: FallbackPolicy, dry_run: bool) -> ImportSettings {
        ImportSettings {
            org: "acme-gh".to_string(),
            engine: EngineOptions {
                fallback,
                ..EngineOptions::default()
            },
            dry_run,
        }
    }

    async fn run(
        source: &FakeSource,
        destination: &FakeDestination,
        settings: &ImportSettings,
    ) -> RunReport {
        let mut report = RunReport::new();
        let resources = discover(source, ROOT_GROUP, &ProjectScope::default(), &mut report)
            .await
            .unwrap();
        import_merge_requests(
            source,
            destination,
            &IdentityMap::default(),
            &resources,
            settings,
            &mut report,
        )
        .await;
        report
    }

    fn ten_merge_requests() -> FakeSource {
        (1..=10).fold(FakeSource::new().project(10, "api"), |source, iid| {
            source.merge_request(10, sample_record(iid, &format!("MR {iid}")))
        })
    }

    #[tokio::test]
    async fn test_failed_record_does_not_stop_batch() {
        let source = ten_merge_requests();
        let destination = FakeDestination::with_branches(&["main", "feature/login"]);
        destination.fail_title("MR 3");

        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        assert_eq!(report.records(Status::Failed), vec![3]);
        assert_eq!(report.records(Status::Processed), vec![1, 2, 4, 5, 6, 7, 8, 9, 10]);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.resource, "acme/api");
        assert!(failure.detail.contains("500"));
        assert!(failure.detail.ends_with("(transient, rerun to retry)"));
        assert_eq!(destination.pull_count(), 9);
    }

    #[tokio::test]
    async fn test_rerun_fills_gaps_only() {
        let source = ten_merge_requests();
        let destination = FakeDestination::with_branches(&["main", "feature/login"]);
        destination.fail_title("MR 3");
        run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        destination.clear_failures();
        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        assert!(!report.has_failures());
        assert_eq!(destination.pull_count(), 10);
        let created: Vec<_> = report
            .with_status(Status::Processed)
            .filter(|e| e.detail.starts_with("created"))
            .map(|e| e.record)
            .collect();
        assert_eq!(created, vec![Some(3)]);
    }

    #[tokio::test]
    async fn test_no_diff_substitutes_one_issue_per_record() {
        let source = FakeSource::new()
            .project(10, "api")
            .merge_request(10, sample_record(1, "Old work"))
            .merge_request(10, sample_record(2, "Older work"));
        let destination = FakeDestination::with_branches(&["main"]);

        let report = run(
            &source,
            &destination,
            &settings(FallbackPolicy::from_switch(true), false),
        )
        .await;

        assert_eq!(report.records(Status::Processed), vec![1, 2]);
        assert_eq!(destination.pull_count(), 0);
        assert_eq!(destination.issue_count(), 2);
        let issue = destination.object(1).unwrap();
        assert_eq!(issue.kind, ObjectKind::Issue);
        assert_eq!(issue.title, "[Historical MR] Old work");
        assert_eq!(issue.labels, vec![HISTORICAL_MR_LABEL.to_string()]);
    }

    #[tokio::test]
    async fn test_no_diff_skip_creates_nothing() {
        let source = FakeSource::new()
            .project(10, "api")
            .merge_request(10, sample_record(1, "Old work"));
        let destination = FakeDestination::with_branches(&["main"]);

        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        assert_eq!(report.records(Status::Skipped), vec![1]);
        assert_eq!(report.count(Status::Processed), 0);
        assert_eq!(destination.pull_count() + destination.issue_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_destination_calls() {
        let source = ten_merge_requests();
        let destination = FakeDestination::with_branches(&["main", "feature/login"]);

        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, true)).await;

        assert_eq!(report.count(Status::Processed), 10);
        assert_eq!(destination.mutation_count(), 0);
        assert!(report.entries()[0].detail.contains("acme-gh/api"));
    }

    #[tokio::test]
    async fn test_head_sha_from_detail_recreates_branch() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        let source = FakeSource::new()
            .project(10, "api")
            .merge_request(10, sample_record(1, "Login"))
            .head_sha(10, 1, sha)
            .note(10, 1, note(7, "Looks good", false))
            .note(10, 1, note(8, "added 1 commit", true));
        let destination = FakeDestination::with_branches(&["main"]);
        destination.add_commit(sha);

        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        assert_eq!(report.records(Status::Processed), vec![1]);
        assert_eq!(destination.branch_target("import/feature/login").as_deref(), Some(sha));
        assert_eq!(destination.comments(1).len(), 1);
    }

    #[tokio::test]
    async fn test_broken_listing_fails_resource_and_continues() {
        let source = FakeSource::new()
            .project(10, "api")
            .project(11, "web")
            .break_listing(10)
            .merge_request(11, sample_record(1, "Web change"));
        let destination = FakeDestination::with_branches(&["main", "feature/login"]);

        let report = run(&source, &destination, &settings(FallbackPolicy::Skip, false)).await;

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.resource, "acme/api");
        assert_eq!(failure.record, None);
        assert_eq!(report.records(Status::Processed), vec![1]);
    }
}
