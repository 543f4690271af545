//! Project domain types
//!
//! A project record is created by the request-handling side in
//! `analysis_pending` and advanced by the analysis worker to one of the two
//! terminal statuses. The worker only ever writes partial updates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque project identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can be embedded in a filesystem path as a single component
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted, which covers UUIDs.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a project as seen by the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    AnalysisPending,
    ReadyToDeploy,
    AnalysisFailed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::AnalysisPending => "analysis_pending",
            ProjectStatus::ReadyToDeploy => "ready_to_deploy",
            ProjectStatus::AnalysisFailed => "analysis_failed",
        }
    }

    /// Terminal with respect to the analysis pipeline
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectStatus::ReadyToDeploy | ProjectStatus::AnalysisFailed
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis_pending" => Ok(ProjectStatus::AnalysisPending),
            "ready_to_deploy" => Ok(ProjectStatus::ReadyToDeploy),
            "analysis_failed" => Ok(ProjectStatus::AnalysisFailed),
            other => Err(format!("unknown project status: {}", other)),
        }
    }
}

/// Project record as stored by the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub repo_url: String,
    pub status: ProjectStatus,
    pub language: Option<String>,
    pub dockerfile_path: Option<String>,
    /// Set only when analysis fails
    pub status_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectRecord {
    /// A freshly created project awaiting analysis
    pub fn pending(id: ProjectId, repo_url: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            repo_url: repo_url.into(),
            status: ProjectStatus::AnalysisPending,
            language: None,
            dockerfile_path: None,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a project record
///
/// Only fields that are `Some` are written; everything else on the record is
/// left untouched. Fields cannot be cleared through an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub status: Option<ProjectStatus>,
    pub language: Option<String>,
    pub dockerfile_path: Option<String>,
    pub status_message: Option<String>,
}

impl ProjectUpdate {
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    pub fn dockerfile_path(path: impl Into<String>) -> Self {
        Self {
            dockerfile_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn ready_to_deploy() -> Self {
        Self {
            status: Some(ProjectStatus::ReadyToDeploy),
            ..Default::default()
        }
    }

    pub fn analysis_failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(ProjectStatus::AnalysisFailed),
            status_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.language.is_none()
            && self.dockerfile_path.is_none()
            && self.status_message.is_none()
    }

    /// Applies the set fields to a record and refreshes its `updated_at`
    pub fn apply_to(&self, record: &mut ProjectRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(language) = &self.language {
            record.language = Some(language.clone());
        }
        if let Some(path) = &self.dockerfile_path {
            record.dockerfile_path = Some(path.clone());
        }
        if let Some(message) = &self.status_message {
            record.status_message = Some(message.clone());
        }
        record.updated_at = chrono::Utc::now();
    }
}
