use futures::StreamExt;
use log::{info, warn};

use super::destination_repo;
use super::merge_requests::ImportSettings;
use super::report::RunReport;
use crate::error::Result;
use crate::identity::IdentityMap;
use crate::model::{ChangeRecord, Resource};
use crate::source::Source;
use crate::upsert::{Destination, ImportOutcome, ImportRequest, Upsert, UpsertEngine};

/// Recreate the issues of every resource, labels (with colours) first.
pub async fn import_issues<S, D>(
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
    for resource in resources {
        let repo = destination_repo(&settings.org, resource);
        import_project_issues(source, destination, identities, resource, &repo, settings, report)
            .await;
    }
}

/// Recreate the issues of one resource in the named destination repository.
pub async fn import_project_issues<S, D>(
    source: &S,
    destination: &D,
    identities: &IdentityMap,
    resource: &Resource,
    repo: &str,
    settings: &ImportSettings,
    report: &mut RunReport,
) where
    S: Source + ?Sized,
    D: Destination + ?Sized,
{
    let mut engine = UpsertEngine::new(destination, identities, settings.engine.clone());
    let path = resource.display_path();
    info!("Importing issues of {path} into {repo}");

    if !settings.dry_run {
        sync_labels(source, destination, resource.id, repo).await;
    }

    let mut records = source.issues(resource.id);
    while let Some(item) = records.next().await {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                report.failed(path, None, format!("issue listing failed: {e}"));
                break;
            }
        };

        if settings.dry_run {
            report.processed(
                path,
                Some(record.iid),
                format!("dry run: would import issue '{}' into {repo}", record.title),
            );
            continue;
        }

        let iid = record.iid;
        match import_one(source, &mut engine, repo, resource.id, &record).await {
            Ok(ImportOutcome::Skipped { reason }) => report.skipped(path, Some(iid), reason),
            Ok(outcome) => report.processed(path, Some(iid), outcome.describe()),
            Err(e) => report.error(path, Some(iid), &e),
        }
    }
}

/// Copy project labels with their colours; failures only cost the colour.
async fn sync_labels<S, D>(source: &S, destination: &D, project_id: u64, repo: &str)
where
    S: Source + ?Sized,
    D: Destination + ?Sized,
{
    let labels = match source.labels(project_id).await {
        Ok(labels) => labels,
        Err(e) => {
            warn!("Could not list labels of project {project_id}: {e}");
            return;
        }
    };

    for label in &labels {
        match destination.ensure_label(repo, label).await {
            Ok(Upsert::Failed(reason)) => warn!("Label '{}' in {repo}: {reason}", label.name),
            Err(e) => warn!("Label '{}' in {repo}: {e}", label.name),
            Ok(_) => {}
        }
    }
}

async fn import_one<S, D>(
    source: &S,
    engine: &mut UpsertEngine<'_, D>,
    repo: &str,
    project_id: u64,
    record: &ChangeRecord,
) -> Result<ImportOutcome>
where
    S: Source + ?Sized,
    D: Destination + ?Sized,
{
    let notes = source.issue_notes(project_id, record.iid).await?;
    engine
        .import_issue(ImportRequest {
            repo,
            project_id,
            record,
            notes: &notes,
        })
        .await
}
