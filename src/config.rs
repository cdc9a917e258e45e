use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MigrateError;
use crate::http::{RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES};

/// Configuration file structure for glmigrate.
///
/// Holds connection settings shared by every command. Values given on the
/// command line or in the environment override the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// Versioned API root, e.g. `https://gitlab.example.com/api/v4`
    pub api_url: Option<String>,

    /// Personal access token with `api` scope
    pub token: Option<String>,

    /// Group whose whole subtree is migrated
    pub top_group_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// REST root: `https://api.github.com` or `https://<host>/api/v3`
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    pub token: Option<String>,

    /// Organisation receiving the migrated repositories
    pub org: Option<String>,

    /// SSH host used to build push URLs
    #[serde(default = "default_push_host")]
    pub push_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationConfig {
    /// Two-column CSV (or JSON object) mapping GitLab to GitHub usernames
    pub user_map: Option<PathBuf>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token: None,
            org: None,
            push_host: default_push_host(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            user_map: None,
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_push_host() -> String {
    "github.com".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

/// A setting a command cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    GitLabApiUrl,
    GitLabToken,
    TopGroupId,
    GitHubToken,
    GitHubOrg,
}

impl Setting {
    /// Environment variable that provides the setting.
    pub fn env_name(self) -> &'static str {
        match self {
            Self::GitLabApiUrl => "GITLAB_API_URL",
            Self::GitLabToken => "GITLAB_TOKEN",
            Self::TopGroupId => "GITLAB_TOP_GROUP_ID",
            Self::GitHubToken => "GITHUB_TOKEN",
            Self::GitHubOrg => "GITHUB_ORG",
        }
    }

    fn is_set(self, config: &Config) -> bool {
        fn present(value: Option<&String>) -> bool {
            value.is_some_and(|v| !v.trim().is_empty())
        }
        match self {
            Self::GitLabApiUrl => present(config.gitlab.api_url.as_ref()),
            Self::GitLabToken => present(config.gitlab.token.as_ref()),
            Self::TopGroupId => config.gitlab.top_group_id.is_some(),
            Self::GitHubToken => present(config.github.token.as_ref()),
            Self::GitHubOrg => present(config.github.org.as_ref()),
        }
    }
}

/// Values taken from the command line or environment; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub gitlab_api_url: Option<String>,
    pub gitlab_token: Option<String>,
    pub top_group_id: Option<u64>,
    pub github_api_url: Option<String>,
    pub github_token: Option<String>,
    pub github_org: Option<String>,
    pub push_host: Option<String>,
    pub user_map: Option<PathBuf>,
    pub max_retries: Option<u32>,
    pub backoff_ms: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./glmigrate.toml
    /// 3. ./glmigrate.json
    /// 4. ./glmigrate.yaml
    /// 5. ./glmigrate.yml
    /// 6. `<config dir>/glmigrate/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "glmigrate.toml",
            "glmigrate.json",
            "glmigrate.yaml",
            "glmigrate.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = dirs::config_dir().map(|d| d.join("glmigrate").join("config.toml")) {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        let Overrides {
            gitlab_api_url,
            gitlab_token,
            top_group_id,
            github_api_url,
            github_token,
            github_org,
            push_host,
            user_map,
            max_retries,
            backoff_ms,
        } = overrides;

        self.gitlab.api_url = gitlab_api_url.or(self.gitlab.api_url.take());
        self.gitlab.token = gitlab_token.or(self.gitlab.token.take());
        self.gitlab.top_group_id = top_group_id.or(self.gitlab.top_group_id);
        if let Some(url) = github_api_url {
            self.github.api_url = url;
        }
        self.github.token = github_token.or(self.github.token.take());
        self.github.org = github_org.or(self.github.org.take());
        if let Some(host) = push_host {
            self.github.push_host = host;
        }
        self.migration.user_map = user_map.or(self.migration.user_map.take());
        if let Some(retries) = max_retries {
            self.migration.max_retries = retries;
        }
        if let Some(backoff) = backoff_ms {
            self.migration.backoff_ms = backoff;
        }
    }

    /// Fail with one error naming every missing setting.
    pub fn require(&self, settings: &[Setting]) -> std::result::Result<(), MigrateError> {
        let missing: Vec<&str> = settings
            .iter()
            .filter(|s| !s.is_set(self))
            .map(|s| s.env_name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.migration.max_retries, self.migration.backoff_ms)
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected YYYY-MM-DD or an RFC 3339 timestamp: {e}"))
}
