//! Analysis service
//!
//! Runs one analysis job end to end:
//! 1. Purge and recreate the project's workspace
//! 2. Clone the repository
//! 3. Classify the language and record it
//! 4. For a known language, generate a Dockerfile into the workspace and
//!    record its path
//! 5. Purge the workspace, whatever happened
//! 6. Record `ready_to_deploy`, or on any failure record `analysis_failed`
//!    with the cause and hand the failure back to the caller
//!
//! Each record write is its own partial update. Progress written before a
//! failure (the language, typically) is kept.

use async_trait::async_trait;
use devyntra_core::domain::{AnalysisJob, DetectedLanguage, ProjectId, ProjectUpdate};
use devyntra_store::{ProjectStore, StoreError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::lease::ProjectLeases;
use crate::service::classifier;
use crate::service::fetcher::{FetchError, RepositoryFetcher};
use crate::service::generator::{ArtifactGenerator, GenerationError};
use crate::workspace::{WorkspaceError, WorkspaceManager};

/// File name of the generated artifact, relative to the repository root
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Why an analysis job failed
///
/// The display text is what ends up in the project's `status_message`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to prepare workspace: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to clone repository: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to generate Dockerfile: {0}")]
    Generation(#[from] GenerationError),

    #[error("Failed to record analysis progress: {0}")]
    StateWrite(#[from] StoreError),
}

impl AnalysisError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Workspace(_) => "workspace",
            AnalysisError::Fetch(_) => "fetch",
            AnalysisError::Generation(_) => "generation",
            AnalysisError::StateWrite(_) => "state_write",
        }
    }
}

/// What a successful analysis produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub project_id: ProjectId,
    pub language: DetectedLanguage,
    pub dockerfile_path: Option<String>,
}

/// Retry policy for project record writes
#[derive(Debug, Clone, Copy)]
pub struct StateWritePolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl StateWritePolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }
}

impl Default for StateWritePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Service trait for running analysis jobs
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Runs a single attempt of `job` to one of its two terminal writes
    async fn analyze(&self, job: &AnalysisJob) -> Result<AnalysisReport, AnalysisError>;
}

/// Standard implementation of AnalysisService
pub struct StandardAnalysisService {
    store: Arc<dyn ProjectStore>,
    fetcher: Arc<dyn RepositoryFetcher>,
    generator: Arc<dyn ArtifactGenerator>,
    workspaces: WorkspaceManager,
    leases: ProjectLeases,
    state_writes: StateWritePolicy,
}

impl StandardAnalysisService {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        fetcher: Arc<dyn RepositoryFetcher>,
        generator: Arc<dyn ArtifactGenerator>,
        workspaces: WorkspaceManager,
        state_writes: StateWritePolicy,
    ) -> Self {
        Self {
            store,
            fetcher,
            generator,
            workspaces,
            leases: ProjectLeases::new(),
            state_writes,
        }
    }

    /// Steps 1-4; the caller owns workspace cleanup and the terminal write
    async fn run_steps(
        &self,
        job: &AnalysisJob,
        workspace: &Path,
    ) -> Result<AnalysisReport, AnalysisError> {
        let project_id = &job.project_id;

        self.workspaces.reset(workspace).await?;

        self.fetcher.fetch(&job.repo_url, workspace).await?;

        let language = classifier::classify(workspace);
        info!("Project {} classified as {}", project_id, language);
        self.write_state(project_id, &ProjectUpdate::language(language.as_str()))
            .await?;

        let mut dockerfile_path = None;
        if language.is_known() {
            debug!(
                "Requesting Dockerfile for project {} from {}",
                project_id,
                self.generator.name()
            );
            let content = self.generator.generate(language).await?;
            self.workspaces
                .write_file(workspace, DOCKERFILE_NAME, &content)
                .await?;
            self.write_state(project_id, &ProjectUpdate::dockerfile_path(DOCKERFILE_NAME))
                .await?;
            dockerfile_path = Some(DOCKERFILE_NAME.to_string());
        } else {
            info!(
                "Skipping Dockerfile generation for project {}: language unknown",
                project_id
            );
        }

        Ok(AnalysisReport {
            project_id: project_id.clone(),
            language,
            dockerfile_path,
        })
    }

    async fn release_workspace(&self, project_id: &ProjectId, workspace: &Path) {
        if let Err(e) = self.workspaces.purge(workspace).await {
            warn!("Failed to purge workspace for project {}: {}", project_id, e);
        }
    }

    /// Partial update with bounded retry and exponential backoff
    ///
    /// `NotFound` and other non-retryable errors are returned immediately.
    async fn write_state(
        &self,
        project_id: &ProjectId,
        update: &ProjectUpdate,
    ) -> Result<(), StoreError> {
        let policy = self.state_writes;
        let mut attempt = 0;
        let mut delay = policy.initial_delay;

        loop {
            attempt += 1;

            match self.store.update(project_id, update).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            "Recorded update for project {} after {} attempt(s)",
                            project_id, attempt
                        );
                    }
                    return Ok(());
                }
                Err(e) if !e.is_retryable() || attempt >= policy.attempts => {
                    error!(
                        "Failed to record update for project {} (attempt {}/{}): {}",
                        project_id, attempt, policy.attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Failed to record update for project {} (attempt {}/{}): {}",
                        project_id, attempt, policy.attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(policy.max_delay);
                }
            }
        }
    }
}

#[async_trait]
impl AnalysisService for StandardAnalysisService {
    async fn analyze(&self, job: &AnalysisJob) -> Result<AnalysisReport, AnalysisError> {
        let project_id = &job.project_id;
        let _lease = self.leases.acquire(project_id).await;

        info!("Starting analysis of project {} ({})", project_id, job.repo_url);

        let result = match self.workspaces.path_for(project_id) {
            Ok(workspace) => {
                let result = self.run_steps(job, &workspace).await;
                self.release_workspace(project_id, &workspace).await;
                result
            }
            Err(e) => Err(e.into()),
        };

        let result = match result {
            Ok(report) => self
                .write_state(project_id, &ProjectUpdate::ready_to_deploy())
                .await
                .map(|()| report)
                .map_err(AnalysisError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                info!(
                    "Project {} is ready to deploy (language: {})",
                    project_id, report.language
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    "Analysis of project {} failed at {} step: {}",
                    project_id,
                    e.kind(),
                    e
                );
                let update = ProjectUpdate::analysis_failed(e.to_string());
                if let Err(write_err) = self.write_state(project_id, &update).await {
                    error!(
                        "Project {} may remain in analysis_pending: could not record failure: {}",
                        project_id, write_err
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devyntra_core::domain::{ProjectRecord, ProjectStatus};
    use devyntra_store::InMemoryProjectStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Copies a fixed file set into the workspace instead of cloning
    struct FakeFetcher {
        files: Vec<&'static str>,
        links: Vec<(&'static str, std::path::PathBuf)>,
        fail: bool,
    }

    impl FakeFetcher {
        fn with_files(files: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                files: files.to_vec(),
                links: Vec::new(),
                fail: false,
            })
        }

        /// Also places `name` in the workspace as a symlink to `target`
        fn with_link(files: &[&'static str], name: &'static str, target: &Path) -> Arc<Self> {
            Arc::new(Self {
                files: files.to_vec(),
                links: vec![(name, target.to_path_buf())],
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                files: Vec::new(),
                links: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl RepositoryFetcher for FakeFetcher {
        async fn fetch(&self, repo_url: &str, workspace: &Path) -> Result<(), FetchError> {
            if self.fail {
                return Err(FetchError::CloneFailed {
                    exit_code: 128,
                    stderr: format!("fatal: repository '{}' not found", repo_url),
                });
            }
            for file in &self.files {
                std::fs::write(workspace.join(file), "").map_err(FetchError::Spawn)?;
            }
            #[cfg(unix)]
            for (name, target) in &self.links {
                std::os::unix::fs::symlink(target, workspace.join(name))
                    .map_err(FetchError::Spawn)?;
            }
            Ok(())
        }
    }

    struct FakeGenerator {
        response: Result<&'static str, fn() -> GenerationError>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn returning(content: &'static str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(content),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Self::erroring(|| GenerationError::Service("401 Unauthorized".to_string()))
        }

        fn erroring(error: fn() -> GenerationError) -> Arc<Self> {
            Arc::new(Self {
                response: Err(error),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactGenerator for FakeGenerator {
        async fn generate(&self, _language: DetectedLanguage) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.map(str::to_string).map_err(|error| error())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Store and workspace root shared by one test
    struct Harness {
        store: InMemoryProjectStore,
        root: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let store = InMemoryProjectStore::new();
            store
                .insert_pending(&ProjectId::from("p1"), "https://github.com/acme/app.git")
                .await
                .unwrap();
            Self {
                store,
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn service(
            &self,
            fetcher: Arc<dyn RepositoryFetcher>,
            generator: Arc<dyn ArtifactGenerator>,
        ) -> StandardAnalysisService {
            StandardAnalysisService::new(
                Arc::new(self.store.clone()),
                fetcher,
                generator,
                WorkspaceManager::new(self.root.path()),
                StateWritePolicy {
                    attempts: 3,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
            )
        }

        async fn record(&self) -> ProjectRecord {
            self.store
                .get(&ProjectId::from("p1"))
                .await
                .unwrap()
                .unwrap()
        }

        fn workspace_exists(&self) -> bool {
            self.root.path().join("devyntra_project_p1").exists()
        }
    }

    fn job() -> AnalysisJob {
        AnalysisJob::new("p1", "https://github.com/acme/app.git")
    }

    #[tokio::test]
    async fn test_python_repository_is_ready_to_deploy() {
        let harness = Harness::new().await;
        let generator = FakeGenerator::returning("FROM python:3.12-slim\n");
        let service = harness.service(
            FakeFetcher::with_files(&["requirements.txt"]),
            generator.clone(),
        );

        let report = service.analyze(&job()).await.unwrap();
        assert_eq!(report.language, DetectedLanguage::Python);
        assert_eq!(report.dockerfile_path.as_deref(), Some("Dockerfile"));

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::ReadyToDeploy);
        assert_eq!(record.language.as_deref(), Some("Python"));
        assert_eq!(record.dockerfile_path.as_deref(), Some("Dockerfile"));
        assert!(record.status_message.is_none());
        assert_eq!(generator.calls(), 1);
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_unknown_language_skips_generation() {
        let harness = Harness::new().await;
        let generator = FakeGenerator::returning("FROM scratch\n");
        let service = harness.service(FakeFetcher::with_files(&["README.md"]), generator.clone());

        let report = service.analyze(&job()).await.unwrap();
        assert_eq!(report.language, DetectedLanguage::Unknown);
        assert!(report.dockerfile_path.is_none());

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::ReadyToDeploy);
        assert_eq!(record.language.as_deref(), Some("Unknown"));
        assert!(record.dockerfile_path.is_none());
        assert_eq!(generator.calls(), 0);
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_project_failed() {
        let harness = Harness::new().await;
        let generator = FakeGenerator::returning("FROM scratch\n");
        let service = harness.service(FakeFetcher::failing(), generator.clone());

        let err = service.analyze(&job()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Fetch(_)));

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        let message = record.status_message.unwrap();
        assert!(message.starts_with("Failed to clone repository"));
        assert!(record.language.is_none());
        assert!(record.dockerfile_path.is_none());
        assert_eq!(generator.calls(), 0);
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_unreachable_repository_with_git() {
        let harness = Harness::new().await;
        let missing = harness.root.path().join("no-such-repo");
        let service = harness.service(
            Arc::new(crate::service::fetcher::GitFetcher::new(Duration::from_secs(60))),
            FakeGenerator::returning("FROM scratch\n"),
        );

        let job = AnalysisJob::new("p1", missing.to_string_lossy().to_string());
        assert!(service.analyze(&job).await.is_err());

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        assert!(!record.status_message.unwrap_or_default().is_empty());
        assert!(record.language.is_none());
        assert!(record.dockerfile_path.is_none());
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_language() {
        let harness = Harness::new().await;
        let service = harness.service(
            FakeFetcher::with_files(&["package.json", "go.mod"]),
            FakeGenerator::failing(),
        );

        let err = service.analyze(&job()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Generation(_)));

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        assert_eq!(record.language.as_deref(), Some("JavaScript"));
        assert!(record.dockerfile_path.is_none());
        assert!(
            record
                .status_message
                .unwrap()
                .starts_with("Failed to generate Dockerfile")
        );
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_generation_timeout_keeps_language() {
        let harness = Harness::new().await;
        let service = harness.service(
            FakeFetcher::with_files(&["requirements.txt"]),
            FakeGenerator::erroring(|| GenerationError::Timeout { seconds: 120 }),
        );

        let err = service.analyze(&job()).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Generation(GenerationError::Timeout { seconds: 120 })
        ));

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        assert_eq!(record.language.as_deref(), Some("Python"));
        assert!(record.dockerfile_path.is_none());
        assert_eq!(
            record.status_message.as_deref(),
            Some("Failed to generate Dockerfile: generation request timed out after 120s")
        );
        assert!(!harness.workspace_exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dockerfile_symlink_in_repository_is_not_followed() {
        let harness = Harness::new().await;
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim.conf");
        std::fs::write(&victim, "keep me\n").unwrap();

        let service = harness.service(
            FakeFetcher::with_link(&["go.mod"], "Dockerfile", &victim),
            FakeGenerator::returning("FROM golang:1.22\n"),
        );
        let report = service.analyze(&job()).await.unwrap();

        assert_eq!(report.dockerfile_path.as_deref(), Some("Dockerfile"));
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "keep me\n");
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_stale_workspace_is_purged_before_fetch() {
        let harness = Harness::new().await;
        let stale = harness.root.path().join("devyntra_project_p1");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("package.json"), "{}").unwrap();

        let service = harness.service(
            FakeFetcher::with_files(&["pom.xml"]),
            FakeGenerator::returning("FROM eclipse-temurin:21-jre\n"),
        );
        let report = service.analyze(&job()).await.unwrap();

        assert_eq!(report.language, DetectedLanguage::Java);
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_invalid_project_id_fails_without_workspace() {
        let harness = Harness::new().await;
        let bad_id = ProjectId::from("../escape");
        harness
            .store
            .insert_pending(&bad_id, "https://github.com/acme/app.git")
            .await
            .unwrap();
        let service = harness.service(
            FakeFetcher::with_files(&["go.mod"]),
            FakeGenerator::returning("FROM golang\n"),
        );

        let err = service
            .analyze(&AnalysisJob::new(bad_id.clone(), "https://github.com/acme/app.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Workspace(_)));

        let record = harness.store.get(&bad_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        assert_eq!(std::fs::read_dir(harness.root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_transient_state_write_failures_are_retried() {
        let harness = Harness::new().await;
        harness.store.fail_next_updates(2).await;
        let service = harness.service(
            FakeFetcher::with_files(&["go.mod"]),
            FakeGenerator::returning("FROM golang:1.22\n"),
        );

        service.analyze(&job()).await.unwrap();

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::ReadyToDeploy);
        assert_eq!(record.language.as_deref(), Some("Go"));
    }

    #[tokio::test]
    async fn test_exhausted_state_writes_fail_the_job() {
        let harness = Harness::new().await;
        harness.store.fail_next_updates(3).await;
        let service = harness.service(
            FakeFetcher::with_files(&["go.mod"]),
            FakeGenerator::returning("FROM golang:1.22\n"),
        );

        let err = service.analyze(&job()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::StateWrite(_)));

        let record = harness.record().await;
        assert_eq!(record.status, ProjectStatus::AnalysisFailed);
        assert!(record.language.is_none());
        assert!(!harness.workspace_exists());
    }

    #[tokio::test]
    async fn test_missing_project_record_is_not_retried() {
        let harness = Harness::new().await;
        let service = harness.service(
            FakeFetcher::with_files(&["go.mod"]),
            FakeGenerator::returning("FROM golang:1.22\n"),
        );

        let err = service
            .analyze(&AnalysisJob::new("ghost", "https://github.com/acme/ghost.git"))
            .await
            .unwrap_err();
        match err {
            AnalysisError::StateWrite(e) => assert!(e.is_not_found()),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!harness.root.path().join("devyntra_project_ghost").exists());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_for_same_project_do_not_collide() {
        let harness = Harness::new().await;
        let service = Arc::new(harness.service(
            FakeFetcher::with_files(&["requirements.txt"]),
            FakeGenerator::returning("FROM python:3.12-slim\n"),
        ));

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.analyze(&job()).await })
        };
        let second = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.analyze(&job()).await })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(harness.record().await.status, ProjectStatus::ReadyToDeploy);
        assert!(!harness.workspace_exists());
    }

    #[test]
    fn test_error_kinds() {
        let err = AnalysisError::from(GenerationError::EmptyResponse);
        assert_eq!(err.kind(), "generation");
        assert_eq!(
            err.to_string(),
            "Failed to generate Dockerfile: generative service returned an empty response"
        );
    }
}
