//! Store trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Job;

/// Errors that can occur in the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The job exists in no tier. Distinct from any zero-valued record.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A tier could not serve the operation. Absorbed by the tiered store
    /// through degradation; never surfaced to API callers.
    #[error("Store tier '{tier}' unavailable: {message}")]
    TierUnavailable { tier: &'static str, message: String },

    #[error("Record serialization failed: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// One layer of the storage hierarchy.
///
/// A tier is a passive record holder with no business logic; consistency
/// across tiers is the [`super::TieredJobStore`]'s concern.
#[async_trait]
pub trait JobTier: Send + Sync {
    /// Tier name for logging.
    fn name(&self) -> &'static str;

    /// Read one record. `Ok(None)` means the tier does not hold the job.
    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Write one record, replacing any previous revision.
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Delete one record. Deleting an absent record is a no-op.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Ids of every job the tier holds.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}
