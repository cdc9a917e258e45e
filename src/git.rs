use log::debug;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::{MigrateError, Result};

const GITATTRIBUTES: &str = ".gitattributes";

/// Run an external command, failing on a non-zero exit. Returns trimmed stdout.
async fn run(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let command_line = format!("{program} {}", args.join(" "));
    debug!("Running {command_line}");

    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let output = command.output().await?;

    if !output.status.success() {
        return Err(MigrateError::Git {
            command: command_line,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A local working copy driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct Repo {
    dir: PathBuf,
}

impl Repo {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn git(&self, args: &[&str]) -> Result<String> {
        run("git", args, Some(&self.dir)).await
    }

    /// `git clone --mirror <url> <dest>`.
    pub async fn clone_mirror(url: &str, dest: &Path) -> Result<Self> {
        run("git", &["clone", "--mirror", url, &dest.to_string_lossy()], None).await?;
        Ok(Self::at(dest))
    }

    /// Full-history clone of every branch and tag, with the source remote named `origin_name`.
    pub async fn clone_all_branches(url: &str, dest: &Path, origin_name: &str) -> Result<Self> {
        run(
            "git",
            &[
                "clone",
                "--no-single-branch",
                "--origin",
                origin_name,
                url,
                &dest.to_string_lossy(),
            ],
            None,
        )
        .await?;
        let repo = Self::at(dest);
        repo.git(&["fetch", "--all", "--tags"]).await?;
        Ok(repo)
    }

    /// Add `name` pointing at `url`, or repoint it if it already exists.
    pub async fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        let remotes = self.git(&["remote"]).await?;
        if remotes.lines().any(|r| r.trim() == name) {
            self.git(&["remote", "set-url", name, url]).await?;
        } else {
            self.git(&["remote", "add", name, url]).await?;
        }
        Ok(())
    }

    pub async fn has_staged_changes(&self) -> Result<bool> {
        Ok(!self.git(&["diff", "--cached", "--name-only"]).await?.is_empty())
    }
}

/// Fail early when `git lfs` is not installed.
pub async fn require_lfs() -> Result<()> {
    run("git", &["lfs", "version"], None)
        .await
        .map(|version| debug!("Using {version}"))
        .map_err(|e| MigrateError::Config(format!("git-lfs not found in PATH: {e}")))
}

/// Merge LFS tracking lines for `patterns` into `.gitattributes`.
///
/// A new file keeps the pattern order; merging into an existing file yields
/// the de-duplicated, sorted union. Returns whether the file content changed.
pub fn write_gitattributes(repo_dir: &Path, patterns: &[String]) -> Result<bool> {
    let path = repo_dir.join(GITATTRIBUTES);
    let lines: Vec<String> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| format!("{p} filter=lfs diff=lfs merge=lfs -text"))
        .collect();

    let previous = if path.exists() {
        Some(std::fs::read_to_string(&path)?)
    } else {
        None
    };

    let content = match &previous {
        Some(existing) => {
            let merged: BTreeSet<&str> = existing
                .lines()
                .chain(lines.iter().map(String::as_str))
                .collect();
            format!("{}\n", merged.into_iter().collect::<Vec<_>>().join("\n"))
        }
        None => format!("{}\n", lines.join("\n")),
    };

    if previous.as_deref() == Some(content.as_str()) {
        return Ok(false);
    }
    std::fs::write(&path, content)?;
    Ok(true)
}
