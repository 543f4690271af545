//! Job domain types

use serde::{Deserialize, Serialize};

use super::project::ProjectId;

/// A queued request to analyze one project's repository
///
/// Created by the project-creation endpoint and consumed once by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub project_id: ProjectId,
    pub repo_url: String,
}

impl AnalysisJob {
    pub fn new(project_id: impl Into<ProjectId>, repo_url: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            repo_url: repo_url.into(),
        }
    }
}

/// Result of a job posted to the queue's task-result channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub project_id: ProjectId,
    pub succeeded: bool,
    pub message: String,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl JobOutcome {
    /// Outcome for a job that reached `ready_to_deploy`
    pub fn succeeded(project_id: ProjectId) -> Self {
        let message = format!("Successfully analyzed project {}.", project_id);
        Self {
            project_id,
            succeeded: true,
            message,
            finished_at: chrono::Utc::now(),
        }
    }

    /// Outcome for a job that failed with the given cause
    pub fn failed(project_id: ProjectId, cause: impl Into<String>) -> Self {
        Self {
            project_id,
            succeeded: false,
            message: cause.into(),
            finished_at: chrono::Utc::now(),
        }
    }
}
