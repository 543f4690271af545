//! Repository fetcher
//!
//! Clones a remote repository into a job's workspace with the system `git`.
//! The clone is a full clone with no credentials: private repositories fail
//! instead of prompting. Only network transports are allowed by default, so a
//! job cannot copy a repository off the worker's own filesystem.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors fetching a repository
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] io::Error),

    #[error("git clone exited with code {exit_code}: {stderr}")]
    CloneFailed { exit_code: i32, stderr: String },

    #[error("git clone timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("clone target {0} already has content")]
    TargetNotEmpty(String),
}

/// Service trait for fetching repositories into a workspace
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Clones `repo_url` into `workspace`
    ///
    /// `workspace` must be absent or an empty directory. No retries.
    async fn fetch(&self, repo_url: &str, workspace: &Path) -> Result<(), FetchError>;
}

/// Checks that git is installed and runnable
pub async fn check_git_available() -> Result<String, FetchError> {
    let output = Command::new("git")
        .arg("--version")
        .output()
        .await
        .map_err(FetchError::Spawn)?;

    if !output.status.success() {
        return Err(FetchError::CloneFailed {
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!("Git is available: {}", version);
    Ok(version)
}

/// Transports `git clone` may use, in `GIT_ALLOW_PROTOCOL` syntax
pub const DEFAULT_ALLOWED_PROTOCOLS: &str = "https:ssh:git";

/// RepositoryFetcher backed by `git clone`
#[derive(Debug, Clone)]
pub struct GitFetcher {
    timeout: Duration,
    allowed_protocols: String,
}

impl GitFetcher {
    /// Creates a fetcher whose clones are killed after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            allowed_protocols: DEFAULT_ALLOWED_PROTOCOLS.to_string(),
        }
    }

    /// Replaces the allowed transports, e.g. `"file"` for local paths
    pub fn with_allowed_protocols(mut self, protocols: impl Into<String>) -> Self {
        self.allowed_protocols = protocols.into();
        self
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(&self, repo_url: &str, workspace: &Path) -> Result<(), FetchError> {
        if has_entries(workspace) {
            return Err(FetchError::TargetNotEmpty(workspace.display().to_string()));
        }

        info!("Cloning {} into {}", repo_url, workspace.display());

        // `--` keeps a hostile URL from being parsed as a git option.
        let child = Command::new("git")
            .arg("clone")
            .arg("--")
            .arg(repo_url)
            .arg(workspace)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ALLOW_PROTOCOL", &self.allowed_protocols)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FetchError::Spawn)?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(FetchError::Spawn)?,
            Err(_) => {
                return Err(FetchError::TimedOut {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("git clone stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            return Err(FetchError::CloneFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: last_line(&stderr),
            });
        }

        info!("Cloned {} successfully", repo_url);
        Ok(())
    }
}

fn has_entries(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// git reports the cause of a failed clone on its last stderr line
fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("no output")
        .to_string()
}
