//! Devyntra Store
//!
//! Storage layer for the analysis worker: the analysis job queue and the
//! project state store.
//!
//! Both are exposed as traits so the worker can be driven by fakes in tests.
//! PostgreSQL implementations back the running worker; in-memory
//! implementations live in [`memory`].

pub mod db;
pub mod error;
pub mod memory;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::{InMemoryAnalysisQueue, InMemoryProjectStore};
pub use repository::{AnalysisQueue, PgAnalysisQueue, PgProjectStore, ProjectStore};
