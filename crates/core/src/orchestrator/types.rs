//! Orchestrator error and status types.

use serde::Serialize;
use thiserror::Error;

use crate::governor::GovernorStatus;
use crate::store::StoreError;

/// Caller-facing errors from the orchestrator's API surface.
#[derive(Debug, Error)]
pub enum JobError {
    /// Request rejected before any work started.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Job unknown in every tier, or already reaped.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job exists but its archive is not available.
    #[error("Job {id} is not ready: status is {status}")]
    NotReady { id: String, status: &'static str },

    /// Store failure that could not be absorbed by tier degradation.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Store(other),
        }
    }
}

/// Snapshot of the orchestrator's runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Jobs with a live driver task in this process.
    pub active_jobs: usize,
    pub governor: GovernorStatus,
}
