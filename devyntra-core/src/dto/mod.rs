//! Data Transfer Objects
//!
//! Wire representations exchanged with components outside the worker.
//! Currently this is only the analysis queue payload.

pub mod job;
