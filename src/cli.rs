use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use crate::config::{parse_timestamp, Config, Overrides, Setting};
use crate::identity::IdentityMap;
use crate::migrate::export::{export_audit, ExportSettings};
use crate::migrate::issues::import_issues;
use crate::migrate::lfs::{migrate_lfs, parse_patterns, LfsSettings};
use crate::migrate::merge_requests::{import_merge_requests, ImportSettings};
use crate::migrate::mirror::{mirror_repositories, MirrorSettings};
use crate::migrate::report::RunReport;
use crate::migrate::users::{block_users, BlockSettings};
use crate::migrate::{discover, ProjectScope};
use crate::model::{Resource, TimeWindow};
use crate::output::print_report;
use crate::pacing::Pacer;
use crate::providers::{GitHubClient, GitLabClient};
use crate::upsert::{EngineOptions, FallbackPolicy};

const SOURCE_SETTINGS: [Setting; 3] = [
    Setting::GitLabApiUrl,
    Setting::GitLabToken,
    Setting::TopGroupId,
];

const TRANSFER_SETTINGS: [Setting; 5] = [
    Setting::GitLabApiUrl,
    Setting::GitLabToken,
    Setting::TopGroupId,
    Setting::GitHubToken,
    Setting::GitHubOrg,
];

#[derive(Parser)]
#[command(name = "glmigrate")]
#[command(author, version, about = "GitLab to GitHub migration toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./glmigrate.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct ConnectionArgs {
    /// GitLab API root, e.g. https://gitlab.example.com/api/v4
    #[arg(long, global = true, env = "GITLAB_API_URL")]
    gitlab_url: Option<String>,

    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// Top-level group whose subtree is migrated
    #[arg(long, global = true, env = "GITLAB_TOP_GROUP_ID")]
    group_id: Option<u64>,

    /// GitHub REST root: https://api.github.com or https://<host>/api/v3
    #[arg(long, global = true, env = "GITHUB_API_URL")]
    github_api_url: Option<String>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, global = true, env = "GITHUB_ORG")]
    org: Option<String>,

    /// SSH host used in push URLs, e.g. github.com or an Enterprise host
    #[arg(long, global = true)]
    push_host: Option<String>,

    /// CSV (or .json) table mapping GitLab usernames to GitHub usernames
    #[arg(long, global = true, env = "USER_MAP_CSV")]
    user_map: Option<PathBuf>,

    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Base delay of the retry backoff in milliseconds
    #[arg(long, global = true)]
    backoff_ms: Option<u64>,
}

#[derive(Args)]
struct ScopeArgs {
    /// Regex matched against the namespaced project path
    #[arg(long, visible_alias = "filter")]
    project_filter: Option<String>,

    #[arg(long, default_value_t = false)]
    include_archived: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export pipelines, jobs, commits and merge requests to CSV
    Export {
        #[arg(long, default_value = "./out")]
        out_dir: PathBuf,

        /// Lower bound, YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,

        /// Upper bound, YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Seconds to pause between API calls
        #[arg(long, default_value_t = 0.0)]
        sleep: f64,

        /// Process at most this many projects (0 = all)
        #[arg(long, default_value_t = 0)]
        max_projects: usize,
    },

    /// Mirror every repository's full history into the GitHub organisation
    Mirror {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Directory for the temporary bare clones
        #[arg(long)]
        work_dir: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Recreate merge requests as pull requests
    ImportMrs {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, default_value_t = false)]
        include_system_notes: bool,

        /// Create a "[Historical MR]" issue when a pull request has no diff
        #[arg(long, default_value_t = false)]
        issue_when_nodiff: bool,

        /// Seconds to pause between replayed comments
        #[arg(long, default_value_t = 0.15)]
        sleep: f64,

        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Recreate issues with their labels and comments
    ImportIssues {
        #[command(flatten)]
        scope: ScopeArgs,

        #[arg(long, default_value_t = false)]
        include_system_notes: bool,

        /// Seconds to pause between replayed comments
        #[arg(long, default_value_t = 0.15)]
        sleep: f64,

        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Rewrite one repository's history onto Git LFS, push it, then import its issues
    MigrateLfs {
        /// Namespaced project path, e.g. group/subgroup/repo
        #[arg(long)]
        gitlab_project: String,

        #[arg(long)]
        github_repo: String,

        /// Defaults to the project's SSH clone URL
        #[arg(long)]
        src_clone_url: Option<String>,

        /// Defaults to git@<push host>:<org>/<repo>.git
        #[arg(long)]
        dst_push_url: Option<String>,

        /// Comma-separated patterns, e.g. *.mp4,*.webm,*.onnx
        #[arg(long, default_value = "*.mp4")]
        lfs_patterns: String,

        /// Kept after the run; defaults to a temporary directory
        #[arg(long)]
        workdir: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        private: bool,

        #[arg(long, default_value_t = false)]
        skip_issues: bool,

        #[arg(long, default_value_t = 0.15)]
        sleep: f64,
    },

    /// Block every active, non-admin GitLab user
    BlockUsers {
        /// Actually block; without it the targets are only listed
        #[arg(long, default_value_t = false)]
        execute: bool,

        /// Seconds to pause between block calls
        #[arg(long, default_value_t = 0.1)]
        sleep: f64,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        let c = &self.connection;
        config.apply(Overrides {
            gitlab_api_url: c.gitlab_url.clone(),
            gitlab_token: c.gitlab_token.clone(),
            top_group_id: c.group_id,
            github_api_url: c.github_api_url.clone(),
            github_token: c.github_token.clone(),
            github_org: c.org.clone(),
            push_host: c.push_host.clone(),
            user_map: c.user_map.clone(),
            max_retries: c.max_retries,
            backoff_ms: c.backoff_ms,
        });
        Ok(config)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.load_config()?;

        match &self.command {
            Commands::Export {
                out_dir,
                since,
                until,
                scope,
                sleep,
                max_projects,
            } => {
                config.require(&SOURCE_SETTINGS)?;
                let gitlab = gitlab_client(&config)?;
                let group_id = top_group(&config);
                let mut report = RunReport::new();
                let resources =
                    discover_projects(&gitlab, group_id, scope, *max_projects, &mut report).await?;

                let settings = ExportSettings {
                    out_dir: out_dir.clone(),
                    group_id,
                    window: TimeWindow {
                        since: *since,
                        until: *until,
                    },
                    pacing: Pacer::from_secs_f64(*sleep),
                };
                export_audit(&gitlab, &resources, &settings, &mut report).await?;
                print_report("Audit export", &report);
            }
            Commands::Mirror {
                scope,
                work_dir,
                dry_run,
            } => {
                config.require(&TRANSFER_SETTINGS)?;
                let gitlab = gitlab_client(&config)?;
                let github = github_client(&config)?;
                let mut report = RunReport::new();
                let resources =
                    discover_projects(&gitlab, top_group(&config), scope, 0, &mut report).await?;

                let work_dir = match work_dir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir()?,
                };
                let settings = MirrorSettings {
                    org: org(&config),
                    push_host: config.github.push_host.clone(),
                    private: true,
                    work_dir,
                    dry_run: *dry_run,
                };
                mirror_repositories(&github, &resources, &settings, &mut report).await;
                print_report("Repository mirror", &report);
            }
            Commands::ImportMrs {
                scope,
                include_system_notes,
                issue_when_nodiff,
                sleep,
                dry_run,
            } => {
                config.require(&TRANSFER_SETTINGS)?;
                let gitlab = gitlab_client(&config)?;
                let github = github_client(&config)?;
                let identities = load_identities(&config)?;
                let mut report = RunReport::new();
                let resources =
                    discover_projects(&gitlab, top_group(&config), scope, 0, &mut report).await?;

                let settings = ImportSettings {
                    org: org(&config),
                    engine: EngineOptions {
                        include_system_notes: *include_system_notes,
                        fallback: FallbackPolicy::from_switch(*issue_when_nodiff),
                        comment_pacing: Pacer::from_secs_f64(*sleep),
                    },
                    dry_run: *dry_run,
                };
                import_merge_requests(
                    &gitlab,
                    &github,
                    &identities,
                    &resources,
                    &settings,
                    &mut report,
                )
                .await;
                print_report("Merge request import", &report);
            }
            Commands::ImportIssues {
                scope,
                include_system_notes,
                sleep,
                dry_run,
            } => {
                config.require(&TRANSFER_SETTINGS)?;
                let gitlab = gitlab_client(&config)?;
                let github = github_client(&config)?;
                let identities = load_identities(&config)?;
                let mut report = RunReport::new();
                let resources =
                    discover_projects(&gitlab, top_group(&config), scope, 0, &mut report).await?;

                let settings = ImportSettings {
                    org: org(&config),
                    engine: EngineOptions {
                        include_system_notes: *include_system_notes,
                        comment_pacing: Pacer::from_secs_f64(*sleep),
                        ..EngineOptions::default()
                    },
                    dry_run: *dry_run,
                };
                import_issues(
                    &gitlab,
                    &github,
                    &identities,
                    &resources,
                    &settings,
                    &mut report,
                )
                .await;
                print_report("Issue import", &report);
            }
            Commands::MigrateLfs {
                gitlab_project,
                github_repo,
                src_clone_url,
                dst_push_url,
                lfs_patterns,
                workdir,
                private,
                skip_issues,
                sleep,
            } => {
                config.require(&[
                    Setting::GitLabApiUrl,
                    Setting::GitLabToken,
                    Setting::GitHubToken,
                    Setting::GitHubOrg,
                ])?;
                let gitlab = gitlab_client(&config)?;
                let github = github_client(&config)?;
                let identities = load_identities(&config)?;
                let org = org(&config);

                let push_url = dst_push_url.clone().unwrap_or_else(|| {
                    format!("git@{}:{org}/{github_repo}.git", config.github.push_host)
                });
                let settings = LfsSettings {
                    project_path: gitlab_project.clone(),
                    repo_name: github_repo.clone(),
                    clone_url: src_clone_url.clone(),
                    push_url,
                    patterns: parse_patterns(lfs_patterns),
                    private: *private,
                    work_dir: workdir.clone(),
                    skip_issues: *skip_issues,
                    issues: ImportSettings {
                        org,
                        engine: EngineOptions {
                            comment_pacing: Pacer::from_secs_f64(*sleep),
                            ..EngineOptions::default()
                        },
                        dry_run: false,
                    },
                };

                let mut report = RunReport::new();
                let outcome = migrate_lfs(&gitlab, &github, &identities, &settings, &mut report).await;
                print_report("LFS migration", &report);
                outcome?;
            }
            Commands::BlockUsers { execute, sleep } => {
                config.require(&[Setting::GitLabApiUrl, Setting::GitLabToken])?;
                let gitlab = gitlab_client(&config)?;
                let settings = BlockSettings {
                    execute: *execute,
                    pacing: Pacer::from_secs_f64(*sleep),
                };
                let mut report = RunReport::new();
                block_users(&gitlab, &settings, &mut report).await?;
                print_report("User blocking", &report);
            }
        }

        Ok(())
    }
}

async fn discover_projects(
    gitlab: &GitLabClient,
    group_id: u64,
    scope: &ScopeArgs,
    max_projects: usize,
    report: &mut RunReport,
) -> Result<Vec<Resource>> {
    let scope = ProjectScope::new(
        scope.include_archived,
        scope.project_filter.as_deref(),
        max_projects,
    )?;
    let resources = discover(gitlab, group_id, &scope, report).await?;
    info!("{} projects in scope", resources.len());
    Ok(resources)
}

fn load_identities(config: &Config) -> Result<IdentityMap> {
    let identities = IdentityMap::load(config.migration.user_map.as_deref())?;
    if identities.is_empty() {
        info!("No user mappings loaded; GitLab usernames are used as-is");
    }
    Ok(identities)
}

// The accessors below run after `Config::require`, so the defaults are never observed.

fn gitlab_client(config: &Config) -> Result<GitLabClient> {
    Ok(GitLabClient::new(
        config.gitlab.api_url.as_deref().unwrap_or_default(),
        config.gitlab.token.as_deref().unwrap_or_default(),
        config.retry_policy(),
    )?)
}

fn github_client(config: &Config) -> Result<GitHubClient> {
    Ok(GitHubClient::new(
        &config.github.api_url,
        config.github.token.as_deref().unwrap_or_default(),
        config.retry_policy(),
    )?)
}

fn top_group(config: &Config) -> u64 {
    config.gitlab.top_group_id.unwrap_or_default()
}

fn org(config: &Config) -> String {
    config.github.org.clone().unwrap_or_default()
}
