//! Job poller
//!
//! Pulls analysis jobs off the queue and runs each in its own task, at most
//! `max_parallel_jobs` at a time. A job's outcome is posted to the queue's
//! result channel once the analysis service has made its terminal write.

use anyhow::{Context, Result};
use devyntra_core::domain::{AnalysisJob, JobOutcome};
use devyntra_store::AnalysisQueue;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::service::AnalysisService;

/// Job poller that continuously dequeues and runs analysis jobs
pub struct JobPoller {
    queue: Arc<dyn AnalysisQueue>,
    analysis: Arc<dyn AnalysisService>,
    semaphore: Arc<Semaphore>,
    max_parallel_jobs: usize,
    poll_interval: Duration,
}

impl JobPoller {
    /// Creates a new job poller
    ///
    /// `poll_interval` is how long to wait after an empty poll or a failed
    /// queue call.
    pub fn new(
        queue: Arc<dyn AnalysisQueue>,
        analysis: Arc<dyn AnalysisService>,
        max_parallel_jobs: usize,
        poll_interval: Duration,
    ) -> Self {
        let max_parallel_jobs = max_parallel_jobs.max(1);
        Self {
            queue,
            analysis,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs)),
            max_parallel_jobs,
            poll_interval,
        }
    }

    /// Runs the polling loop until `shutdown` resolves
    ///
    /// After shutdown no further jobs are dequeued; the call returns once
    /// every in-flight job has finished.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting job poller (max parallel jobs: {})",
            self.max_parallel_jobs
        );

        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.context("Job semaphore closed")?
                }
            };

            // Never raced against shutdown: a popped job must reach a terminal write.
            match self.queue.try_dequeue().await {
                Ok(Some(job)) => {
                    self.spawn_job_task(job, permit);
                    continue;
                }
                Ok(None) => debug!("No analysis jobs available"),
                Err(e) => error!("Failed to dequeue analysis job: {}", e),
            }
            drop(permit);

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(
            "Shutdown requested, waiting for {} in-flight job(s) to finish",
            self.in_flight()
        );
        self.wait_for_in_flight().await?;
        info!("Job poller stopped");
        Ok(())
    }

    /// Number of jobs currently running
    pub fn in_flight(&self) -> usize {
        self.max_parallel_jobs - self.semaphore.available_permits()
    }

    async fn wait_for_in_flight(&self) -> Result<()> {
        let _all = self
            .semaphore
            .acquire_many(self.max_parallel_jobs as u32)
            .await
            .context("Job semaphore closed")?;
        Ok(())
    }

    /// Spawns a task to run a single job
    fn spawn_job_task(&self, job: AnalysisJob, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let analysis = Arc::clone(&self.analysis);

        tokio::spawn(async move {
            let outcome = Self::execute_job(&job, analysis.as_ref()).await;
            if let Err(e) = queue.record_outcome(&outcome).await {
                warn!(
                    "Failed to record outcome for project {}: {}",
                    job.project_id, e
                );
            }
            // Permit is released only after the outcome is posted
            drop(permit);
        });
    }

    async fn execute_job(job: &AnalysisJob, analysis: &dyn AnalysisService) -> JobOutcome {
        info!("Picked up analysis job for project {}", job.project_id);

        match analysis.analyze(job).await {
            Ok(_) => JobOutcome::succeeded(job.project_id.clone()),
            Err(e) => {
                error!("Analysis job for project {} failed: {}", job.project_id, e);
                JobOutcome::failed(job.project_id.clone(), e.to_string())
            }
        }
    }
}
