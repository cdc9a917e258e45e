use futures::TryStreamExt;
use log::{debug, info};
use std::path::PathBuf;

use super::report::{RunReport, Status};
use crate::csv::CsvSink;
use crate::error::Result;
use crate::model::{Resource, TimeWindow};
use crate::pacing::Pacer;
use crate::providers::GitLabClient;

#[rustfmt::skip]
pub const PIPELINE_COLS: &[&str] = &[
    "group_id", "project_id", "project_path",
    "pipeline_id", "iid", "status", "source", "ref", "sha", "web_url",
    "duration", "queued_duration",
    "created_at", "updated_at", "started_at", "finished_at",
    "user_username", "user_name",
];

#[rustfmt::skip]
pub const JOB_COLS: &[&str] = &[
    "group_id", "project_id", "project_path",
    "pipeline_id", "job_id", "name", "stage", "status", "ref", "sha",
    "runner_description", "tag_list", "allow_failure",
    "duration", "queued_duration",
    "created_at", "started_at", "finished_at",
    "user_username", "user_name", "web_url",
];

#[rustfmt::skip]
pub const COMMIT_COLS: &[&str] = &[
    "group_id", "project_id", "project_path",
    "id", "short_id", "title", "message", "author_name", "author_email",
    "committed_date", "created_at", "parent_ids", "web_url",
];

#[rustfmt::skip]
pub const MR_COLS: &[&str] = &[
    "group_id", "project_id", "project_path",
    "iid", "id", "title", "state", "source_branch", "target_branch",
    "author_username", "author_name",
    "created_at", "updated_at", "merged_at", "closed_at",
    "merge_user", "assignees", "reviewers", "labels", "milestone", "web_url",
];

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub out_dir: PathBuf,
    pub group_id: u64,
    pub window: TimeWindow,
    /// Pause after every written row
    pub pacing: Pacer,
}

struct Sinks {
    pipelines: CsvSink,
    jobs: CsvSink,
    commits: CsvSink,
    merge_requests: CsvSink,
}

impl Sinks {
    fn open(settings: &ExportSettings) -> Result<Self> {
        std::fs::create_dir_all(&settings.out_dir)?;
        let dir = &settings.out_dir;
        Ok(Self {
            pipelines: CsvSink::open(&dir.join("pipelines.csv"), PIPELINE_COLS)?,
            jobs: CsvSink::open(&dir.join("pipeline_jobs.csv"), JOB_COLS)?,
            commits: CsvSink::open(&dir.join("commits.csv"), COMMIT_COLS)?,
            merge_requests: CsvSink::open(&dir.join("merge_requests.csv"), MR_COLS)?,
        })
    }
}

/// Append the pipeline, job, commit and merge-request history of every
/// resource to the CSV files under `out_dir`.
///
/// Each section fails soft per project: a failed listing is reported and
/// the next section runs.
///
/// # Errors
///
/// Only when the output files cannot be opened.
pub async fn export_audit(
    client: &GitLabClient,
    resources: &[Resource],
    settings: &ExportSettings,
    report: &mut RunReport,
) -> Result<()> {
    let mut sinks = Sinks::open(settings)?;
    info!("Writing audit export to {}", settings.out_dir.display());

    for resource in resources {
        let path = resource.display_path();
        let prefix = vec![
            settings.group_id.to_string(),
            resource.id.to_string(),
            path.to_string(),
        ];
        let failures_before = report.count(Status::Failed);

        let pipelines =
            export_pipelines(client, resource, &prefix, settings, &mut sinks, report).await;
        let commits =
            export_commits(client, resource.id, &prefix, settings, &mut sinks.commits).await;
        let merge_requests = export_merge_requests(
            client,
            resource.id,
            &prefix,
            settings,
            &mut sinks.merge_requests,
        )
        .await;

        let mut counts = Vec::new();
        for (section, result) in [
            ("pipelines", pipelines),
            ("commits", commits),
            ("merge requests", merge_requests),
        ] {
            match result {
                Ok(count) => counts.push(format!("{count} {section}")),
                Err(e) => report.failed(path, None, format!("{section} export failed: {e}")),
            }
        }

        if report.count(Status::Failed) == failures_before {
            report.processed(path, None, format!("exported {}", counts.join(", ")));
        }
    }

    debug!(
        "Export files: {}, {}, {}, {}",
        sinks.pipelines.path().display(),
        sinks.jobs.path().display(),
        sinks.commits.path().display(),
        sinks.merge_requests.path().display()
    );
    Ok(())
}

/// Job listing failures are reported per pipeline and do not end the section.
async fn export_pipelines(
    client: &GitLabClient,
    resource: &Resource,
    prefix: &[String],
    settings: &ExportSettings,
    sinks: &mut Sinks,
    report: &mut RunReport,
) -> Result<usize> {
    let project_id = resource.id;
    let mut pipelines = client.pipelines(project_id, &settings.window);
    let mut count = 0;

    while let Some(pipeline) = pipelines.try_next().await? {
        let detail = match client.pipeline(project_id, pipeline.id).await {
            Ok(detail) => detail,
            Err(e) => {
                debug!("Pipeline {} detail unavailable, using list entry: {e}", pipeline.id);
                pipeline.clone()
            }
        };
        sinks.pipelines.append(&pipeline.export_row(&detail, prefix))?;
        count += 1;

        let jobs = export_jobs(client, project_id, pipeline.id, prefix, settings, &mut sinks.jobs);
        if let Err(e) = jobs.await {
            report.failed(
                resource.display_path(),
                Some(pipeline.id),
                format!("jobs export failed: {e}"),
            );
        }

        settings.pacing.pause().await;
    }

    Ok(count)
}

async fn export_jobs(
    client: &GitLabClient,
    project_id: u64,
    pipeline_id: u64,
    prefix: &[String],
    settings: &ExportSettings,
    sink: &mut CsvSink,
) -> Result<usize> {
    let mut jobs = client.pipeline_jobs(project_id, pipeline_id);
    let mut count = 0;
    while let Some(job) = jobs.try_next().await? {
        sink.append(&job.export_row(pipeline_id, prefix))?;
        count += 1;
        settings.pacing.pause().await;
    }
    Ok(count)
}

async fn export_commits(
    client: &GitLabClient,
    project_id: u64,
    prefix: &[String],
    settings: &ExportSettings,
    sink: &mut CsvSink,
) -> Result<usize> {
    let mut commits = client.commits(project_id, &settings.window);
    let mut count = 0;
    while let Some(commit) = commits.try_next().await? {
        sink.append(&commit.export_row(prefix))?;
        count += 1;
        settings.pacing.pause().await;
    }
    Ok(count)
}

async fn export_merge_requests(
    client: &GitLabClient,
    project_id: u64,
    prefix: &[String],
    settings: &ExportSettings,
    sink: &mut CsvSink,
) -> Result<usize> {
    let mut merge_requests = client.merge_request_list(project_id, &settings.window);
    let mut count = 0;
    while let Some(merge_request) = merge_requests.try_next().await? {
        sink.append(&merge_request.export_row(prefix))?;
        count += 1;
        settings.pacing.pause().await;
    }
    Ok(count)
}
