use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::report::RunReport;
use crate::error::{MigrateError, Result};
use crate::git::Repo;
use crate::model::Resource;
use crate::providers::GitHubClient;
use crate::upsert::Upsert;

#[derive(Debug, Clone)]
pub struct MirrorSettings {
    pub org: String,
    /// SSH host used in push URLs, e.g. `github.com` or an Enterprise host
    pub push_host: String,
    pub private: bool,
    /// Directory receiving the temporary bare mirrors
    pub work_dir: PathBuf,
    pub dry_run: bool,
}

impl MirrorSettings {
    pub fn push_url(&self, repo_name: &str) -> String {
        format!("git@{}:{}/{repo_name}.git", self.push_host, self.org)
    }
}

/// Mirror every resource's full git history into `<org>/<flattened path>`.
pub async fn mirror_repositories(
    github: &GitHubClient,
    resources: &[Resource],
    settings: &MirrorSettings,
    report: &mut RunReport,
) {
    for resource in resources {
        let path = resource.display_path();
        let Some(clone_url) = resource.clone_url.as_deref() else {
            report.skipped(path, None, "no SSH clone URL");
            continue;
        };
        let name = resource.flattened_name();
        let push_url = settings.push_url(&name);

        if settings.dry_run {
            let detail = format!("dry run: would mirror {clone_url} to {push_url}");
            report.processed(path, None, detail);
            continue;
        }

        let target = format!("{}/{name}", settings.org);
        match mirror_one(github, settings, clone_url, &name, &push_url).await {
            Ok(Upsert::Created(())) => {
                report.processed(path, None, format!("mirrored into new repository {target}"));
            }
            Ok(_) => report.processed(path, None, format!("mirrored into {target}")),
            Err(e) => report.error(path, None, &e),
        }
    }
}

async fn mirror_one(
    github: &GitHubClient,
    settings: &MirrorSettings,
    clone_url: &str,
    name: &str,
    push_url: &str,
) -> Result<Upsert<()>> {
    let repository = github
        .ensure_repository(&settings.org, name, settings.private)
        .await?;

    let mirror_dir = settings.work_dir.join(format!("{name}.git"));
    remove_dir(&mirror_dir)?;

    info!("Cloning {clone_url}");
    let pushed = async {
        let repo = Repo::clone_mirror(clone_url, &mirror_dir).await?;
        repo.git(&["remote", "set-url", "--push", "origin", push_url])
            .await?;
        info!("Pushing mirror to {push_url}");
        repo.git(&["push", "--mirror"]).await?;
        Ok::<(), MigrateError>(())
    }
    .await;

    if let Err(e) = remove_dir(&mirror_dir) {
        warn!("Could not remove {}: {e}", mirror_dir.display());
    }
    pushed.map(|()| repository)
}

fn remove_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Removing {}", dir.display());
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}
