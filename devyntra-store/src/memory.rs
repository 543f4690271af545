//! In-memory store implementations
//!
//! Process-local versions of the queue and the project store. They keep the
//! same contracts as the PostgreSQL repositories and are used to drive the
//! worker in tests.

use async_trait::async_trait;
use devyntra_core::domain::{AnalysisJob, JobOutcome, ProjectId, ProjectRecord, ProjectUpdate};
use devyntra_core::dto::job::JobPayload;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::error::{Result, StoreError};
use crate::repository::{AnalysisQueue, ProjectStore};

/// In-memory implementation of ProjectStore
///
/// Can be told to fail a number of upcoming updates to exercise the
/// caller's handling of state write failures.
#[derive(Clone, Default)]
pub struct InMemoryProjectStore {
    records: Arc<Mutex<HashMap<ProjectId, ProjectRecord>>>,
    failing_updates: Arc<Mutex<u32>>,
    history: Arc<Mutex<Vec<(ProjectId, ProjectUpdate)>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `update` fail with `Unavailable`
    pub async fn fail_next_updates(&self, count: u32) {
        *self.failing_updates.lock().await = count;
    }

    /// Every successfully applied update, in order
    pub async fn history(&self) -> Vec<(ProjectId, ProjectUpdate)> {
        self.history.lock().await.clone()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn insert_pending(&self, id: &ProjectId, repo_url: &str) -> Result<ProjectRecord> {
        let record = ProjectRecord::pending(id.clone(), repo_url);
        self.records.lock().await.insert(id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &ProjectId, update: &ProjectUpdate) -> Result<()> {
        {
            let mut failing = self.failing_updates.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Unavailable("injected update failure".to_string()));
            }
        }

        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        update.apply_to(record);

        self.history.lock().await.push((id.clone(), update.clone()));
        Ok(())
    }
}

/// In-memory implementation of AnalysisQueue
///
/// Stores encoded payloads so malformed entries can be injected with
/// [`InMemoryAnalysisQueue::push_raw`].
#[derive(Clone, Default)]
pub struct InMemoryAnalysisQueue {
    entries: Arc<Mutex<VecDeque<String>>>,
    available: Arc<Notify>,
    outcomes: Arc<Mutex<Vec<JobOutcome>>>,
}

impl InMemoryAnalysisQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw payload without validating it
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.entries.lock().await.push_back(payload.into());
        self.available.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Outcomes recorded so far, in order
    pub async fn outcomes(&self) -> Vec<JobOutcome> {
        self.outcomes.lock().await.clone()
    }
}

#[async_trait]
impl AnalysisQueue for InMemoryAnalysisQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        let payload = JobPayload::encode(job)?;
        self.push_raw(payload).await;
        Ok(())
    }

    async fn try_dequeue(&self) -> Result<Option<AnalysisJob>> {
        let mut entries = self.entries.lock().await;
        while let Some(raw) = entries.pop_front() {
            if let Some(job) = crate::repository::decode_or_discard(&raw) {
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
            // notify_one stores a permit, so an enqueue racing with the
            // empty check above still wakes this waiter.
            self.available.notified().await;
        }
    }

    async fn record_outcome(&self, outcome: &JobOutcome) -> Result<()> {
        self.outcomes.lock().await.push(outcome.clone());
        Ok(())
    }
}
