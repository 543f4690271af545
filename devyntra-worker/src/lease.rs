//! Per-project leases
//!
//! Workspaces are keyed by project id, so two jobs for the same project
//! would purge each other's clone. A lease serializes them within this
//! process; jobs for different projects never wait on each other.

use devyntra_core::domain::ProjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

type LeaseTable = Arc<Mutex<HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>>>;

/// Table of in-process project leases
#[derive(Clone, Default)]
pub struct ProjectLeases {
    table: LeaseTable,
}

/// Held for the duration of one job; released on drop
pub struct ProjectLease {
    project_id: ProjectId,
    table: LeaseTable,
    _guard: OwnedMutexGuard<()>,
}

impl ProjectLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other job holds the lease for `project_id`, then takes it
    pub async fn acquire(&self, project_id: &ProjectId) -> ProjectLease {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(project_id.clone()).or_default())
        };

        if slot.try_lock().is_err() {
            debug!("Waiting for running job on project {} to finish", project_id);
        }
        let guard = slot.lock_owned().await;

        ProjectLease {
            project_id: project_id.clone(),
            table: Arc::clone(&self.table),
            _guard: guard,
        }
    }

    /// Number of projects with a held or awaited lease
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for ProjectLease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table and this lease's guard reference the slot: nobody waits.
        let idle = table
            .get(&self.project_id)
            .is_some_and(|slot| Arc::strong_count(slot) <= 2);
        if idle {
            table.remove(&self.project_id);
        }
    }
}
