//! Scheduler layer for the worker
//!
//! This layer pulls analysis jobs off the queue and runs them on the
//! analysis service, a bounded number at a time. It owns the lifecycle of a
//! job from dequeue to its recorded outcome.

pub mod poller;

pub use poller::JobPoller;
