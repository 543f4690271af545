//! Workspace management
//!
//! Every job clones into a disposable directory derived from its project id:
//! `<root>/devyntra_project_<project_id>`. A leftover directory from an
//! earlier attempt is purged before cloning, and the directory is purged
//! again when the job ends, whatever the outcome.

use devyntra_core::domain::ProjectId;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const WORKSPACE_PREFIX: &str = "devyntra_project_";

/// Errors preparing or writing into a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("project id '{0}' cannot be used as a workspace name")]
    InvalidProjectId(ProjectId),

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates, resets and removes per-project workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic workspace path for a project
    pub fn path_for(&self, project_id: &ProjectId) -> Result<PathBuf, WorkspaceError> {
        if !project_id.is_path_safe() {
            return Err(WorkspaceError::InvalidProjectId(project_id.clone()));
        }
        Ok(self.root.join(format!("{}{}", WORKSPACE_PREFIX, project_id)))
    }

    /// Purges `path` if present and recreates it as an empty directory
    pub async fn reset(&self, path: &Path) -> Result<(), WorkspaceError> {
        self.purge(path).await?;
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| WorkspaceError::Io {
                action: "create",
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Workspace {} ready", path.display());
        Ok(())
    }

    /// Removes `path` and everything below it; a missing path is not an error
    pub async fn purge(&self, path: &Path) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!("Workspace {} purged", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Io {
                action: "remove",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes `content` to `file_name` inside the workspace, verbatim
    ///
    /// An entry already at the target (a symlink shipped by the cloned
    /// repository, say) is unlinked first and never followed.
    pub async fn write_file(
        &self,
        path: &Path,
        file_name: &str,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let target = path.join(file_name);
        let io_error = |action: &'static str| {
            let target = target.clone();
            move |source| WorkspaceError::Io {
                action,
                path: target,
                source,
            }
        };

        match tokio::fs::remove_file(&target).await {
            Ok(()) => debug!("Replaced existing {} in workspace", target.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("replace")(e)),
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(io_error("create"))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(io_error("write"))?;
        file.flush().await.map_err(io_error("write"))?;

        Ok(target)
    }
}
