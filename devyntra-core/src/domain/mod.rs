//! Core domain types
//!
//! These types represent the entities the analysis pipeline reads and
//! writes. They are shared between the store (for persistence) and the
//! worker (for execution).

pub mod job;
pub mod language;
pub mod project;

pub use job::{AnalysisJob, JobOutcome};
pub use language::DetectedLanguage;
pub use project::{ProjectId, ProjectRecord, ProjectStatus, ProjectUpdate};
