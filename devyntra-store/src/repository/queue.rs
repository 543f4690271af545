//! Analysis queue repository
//!
//! FIFO list of pending analysis jobs plus the task-result channel the
//! worker reports job outcomes on.
//!
//! The PostgreSQL queue pops with `FOR UPDATE SKIP LOCKED`, so concurrent
//! workers never receive the same entry. A popped entry is deleted in the
//! same statement: delivery is at-most-once.

use async_trait::async_trait;
use devyntra_core::domain::{AnalysisJob, JobOutcome};
use devyntra_core::dto::job::JobPayload;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

/// Repository trait for the analysis job queue
#[async_trait]
pub trait AnalysisQueue: Send + Sync {
    /// Appends a job to the tail of the queue
    ///
    /// Returns as soon as the job is stored; never waits for analysis.
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()>;

    /// Pops the job at the head of the queue, if any
    ///
    /// Entries whose payload cannot be decoded are logged and dropped.
    async fn try_dequeue(&self) -> Result<Option<AnalysisJob>>;

    /// Pops the job at the head of the queue, waiting until one is available
    async fn dequeue(&self) -> Result<AnalysisJob>;

    /// Records the final outcome of a job on the task-result channel
    async fn record_outcome(&self, outcome: &JobOutcome) -> Result<()>;
}

/// Decodes a popped payload, logging and discarding malformed entries
pub(crate) fn decode_or_discard(raw: &str) -> Option<AnalysisJob> {
    match JobPayload::decode(raw) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("Discarding queue entry: {} (payload: {})", e, raw);
            None
        }
    }
}

/// PostgreSQL implementation of AnalysisQueue
#[derive(Debug, Clone)]
pub struct PgAnalysisQueue {
    pool: PgPool,
    /// How long `dequeue` sleeps between empty polls
    poll_interval: Duration,
}

impl PgAnalysisQueue {
    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    async fn pop_raw(&self) -> Result<Option<String>> {
        let payload = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM analysis_queue
            WHERE id = (
                SELECT id FROM analysis_queue
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(payload)
    }
}

#[async_trait]
impl AnalysisQueue for PgAnalysisQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        let payload = JobPayload::encode(job)?;

        sqlx::query("INSERT INTO analysis_queue (payload) VALUES ($1)")
            .bind(payload)
            .execute(&self.pool)
            .await?;

        debug!("Enqueued analysis job for project {}", job.project_id);
        Ok(())
    }

    async fn try_dequeue(&self) -> Result<Option<AnalysisJob>> {
        while let Some(raw) = self.pop_raw().await? {
            if let Some(job) = decode_or_discard(&raw) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn dequeue(&self) -> Result<AnalysisJob> {
        loop {
            if let Some(job) = self.try_dequeue().await? {
                return Ok(job);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn record_outcome(&self, outcome: &JobOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_job_results (project_id, succeeded, message, finished_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(outcome.project_id.as_str())
        .bind(outcome.succeeded)
        .bind(&outcome.message)
        .bind(outcome.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_or_discard() {
        let job = decode_or_discard(r#"{"project_id": "p1", "repo_url": "https://x/y.git"}"#);
        assert_eq!(job.map(|j| j.project_id.to_string()), Some("p1".to_string()));
        assert!(decode_or_discard("{}").is_none());
        assert!(decode_or_discard("garbage").is_none());
    }
}
