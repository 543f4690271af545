//! Service layer
//!
//! Services contain the worker's business logic: fetching a repository,
//! classifying it, generating its Dockerfile, and the analysis service that
//! sequences those steps and records their outcome.
//!
//! The external-facing pieces are trait-based so tests can swap in fakes.

pub mod analysis;
pub mod classifier;
pub mod fetcher;
pub mod generator;

// Re-export traits
pub use analysis::AnalysisService;
pub use fetcher::RepositoryFetcher;
pub use generator::ArtifactGenerator;

// Re-export implementations
pub use analysis::{StandardAnalysisService, StateWritePolicy};
pub use fetcher::GitFetcher;
pub use generator::GenAiArtifactGenerator;
