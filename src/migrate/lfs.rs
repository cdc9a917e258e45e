use log::info;
use std::path::{Path, PathBuf};

use super::issues::import_project_issues;
use super::merge_requests::ImportSettings;
use super::report::RunReport;
use crate::error::{MigrateError, Result};
use crate::git::{self, Repo};
use crate::identity::IdentityMap;
use crate::model::Resource;
use crate::providers::{GitHubClient, GitLabClient};

const SOURCE_REMOTE: &str = "gitlab";
const DESTINATION_REMOTE: &str = "github";

#[derive(Debug, Clone)]
pub struct LfsSettings {
    /// Namespaced source project path (`group/subgroup/repo`)
    pub project_path: String,
    /// Destination repository name inside `issues.org`
    pub repo_name: String,
    /// Defaults to the project's SSH clone URL
    pub clone_url: Option<String>,
    pub push_url: String,
    pub patterns: Vec<String>,
    pub private: bool,
    /// Kept after the run when given; otherwise a temporary directory is used
    pub work_dir: Option<PathBuf>,
    pub skip_issues: bool,
    pub issues: ImportSettings,
}

/// Split a comma-separated pattern list, dropping blanks.
pub fn parse_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrite one project's history so matching files become LFS pointers,
/// push it to the destination, then copy its issues.
///
/// # Errors
///
/// Any failing git step, or failure to resolve the project or destination
/// repository. Issue import failures are reported per record instead.
pub async fn migrate_lfs(
    gitlab: &GitLabClient,
    github: &GitHubClient,
    identities: &IdentityMap,
    settings: &LfsSettings,
    report: &mut RunReport,
) -> Result<()> {
    if settings.patterns.is_empty() {
        return Err(MigrateError::Config("at least one LFS pattern is required".into()));
    }
    git::require_lfs().await?;

    let resource: Resource = gitlab.project_by_path(&settings.project_path).await?.into();
    let clone_url = settings
        .clone_url
        .clone()
        .or_else(|| resource.clone_url.clone())
        .ok_or_else(|| {
            MigrateError::Config(format!("no clone URL known for {}", settings.project_path))
        })?;

    // the guard removes a temporary work dir on every exit path
    let (work_dir, _guard) = match &settings.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            (dir.clone(), None)
        }
        None => {
            let temp = tempfile::Builder::new().prefix("glmigrate-lfs-").tempdir()?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };
    info!("Working directory: {}", work_dir.display());

    let repo = rewrite_history(&clone_url, &work_dir, &settings.patterns).await?;

    let org = &settings.issues.org;
    github
        .ensure_repository(org, &settings.repo_name, settings.private)
        .await?;
    push_rewritten(&repo, &settings.push_url).await?;
    report.processed(
        &settings.project_path,
        None,
        format!("history rewritten and pushed to {org}/{}", settings.repo_name),
    );

    if settings.skip_issues {
        info!("Skipping issue import");
        return Ok(());
    }
    let target = format!("{org}/{}", settings.repo_name);
    import_project_issues(
        gitlab,
        github,
        identities,
        &resource,
        &target,
        &settings.issues,
        report,
    )
    .await;
    Ok(())
}

async fn rewrite_history(clone_url: &str, work_dir: &Path, patterns: &[String]) -> Result<Repo> {
    let repo_dir = work_dir.join("repo");
    if repo_dir.exists() {
        std::fs::remove_dir_all(&repo_dir)?;
    }

    info!("Cloning {clone_url}");
    let repo = Repo::clone_all_branches(clone_url, &repo_dir, SOURCE_REMOTE).await?;

    repo.git(&["lfs", "install"]).await?;
    git::write_gitattributes(repo.dir(), patterns)?;
    repo.git(&["add", ".gitattributes"]).await?;
    if repo.has_staged_changes().await? {
        repo.git(&["commit", "-m", "Track large binaries with Git LFS"])
            .await?;
    }

    let include = format!("--include={}", patterns.join(","));
    info!("Rewriting history for {include}");
    repo.git(&["lfs", "migrate", "import", "--everything", &include])
        .await?;
    Ok(repo)
}

/// History was rewritten, so every branch and tag is force-pushed.
async fn push_rewritten(repo: &Repo, push_url: &str) -> Result<()> {
    repo.set_remote(DESTINATION_REMOTE, push_url).await?;
    info!("Pushing branches, tags and LFS objects to {push_url}");
    repo.git(&["push", DESTINATION_REMOTE, "+refs/heads/*:refs/heads/*"])
        .await?;
    repo.git(&["push", DESTINATION_REMOTE, "+refs/tags/*:refs/tags/*"])
        .await?;
    repo.git(&["lfs", "push", "--all", DESTINATION_REMOTE])
        .await?;
    Ok(())
}
