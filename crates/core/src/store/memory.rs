//! In-process fast tier.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::{JobTier, StoreError};
use crate::job::Job;

/// Volatile in-process tier. Always the first consulted; safe for concurrent
/// access from completion callbacks.
#[derive(Default)]
pub struct MemoryTier {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs
            .write()
            .await
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.jobs.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.jobs.read().await.keys().cloned().collect())
    }
}
