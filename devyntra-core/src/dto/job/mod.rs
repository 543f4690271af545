//! Analysis queue payload
//!
//! Producers push UTF-8 JSON objects with exactly two fields,
//! `project_id` and `repo_url`, onto the analysis queue.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::job::AnalysisJob;

/// Wire form of an analysis job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobPayload {
    pub project_id: String,
    pub repo_url: String,
}

/// Errors decoding a queue payload
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("job payload field '{0}' is empty")]
    EmptyField(&'static str),
}

impl JobPayload {
    /// Decodes and validates a raw queue payload
    pub fn decode(raw: &str) -> Result<AnalysisJob, PayloadError> {
        let payload: JobPayload = serde_json::from_str(raw)?;
        AnalysisJob::try_from(payload)
    }

    /// Encodes a job into its queue payload
    pub fn encode(job: &AnalysisJob) -> Result<String, PayloadError> {
        let payload = JobPayload::from(job);
        Ok(serde_json::to_string(&payload)?)
    }
}

impl From<&AnalysisJob> for JobPayload {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            project_id: job.project_id.to_string(),
            repo_url: job.repo_url.clone(),
        }
    }
}

impl TryFrom<JobPayload> for AnalysisJob {
    type Error = PayloadError;

    fn try_from(payload: JobPayload) -> Result<Self, Self::Error> {
        if payload.project_id.trim().is_empty() {
            return Err(PayloadError::EmptyField("project_id"));
        }
        if payload.repo_url.trim().is_empty() {
            return Err(PayloadError::EmptyField("repo_url"));
        }
        Ok(AnalysisJob::new(payload.project_id, payload.repo_url))
    }
}
