//! Repository layer
//!
//! Data access for the two resources the analysis worker shares with the
//! rest of the system: the analysis queue and the project records.
//!
//! All repositories are trait-based to enable testing with in-memory fakes.

mod project;
mod queue;

// Re-export traits
pub use project::ProjectStore;
pub use queue::AnalysisQueue;

// Re-export implementations
pub use project::PgProjectStore;
pub use queue::PgAnalysisQueue;

pub(crate) use queue::decode_or_discard;
