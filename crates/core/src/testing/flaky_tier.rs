//! Store tier with injectable failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::job::Job;
use crate::store::{JobTier, MemoryTier, StoreError};

/// A memory-backed tier whose operations can be made to fail, for testing
/// tier degradation.
pub struct FlakyTier {
    name: &'static str,
    inner: MemoryTier,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
    put_calls: AtomicUsize,
}

impl FlakyTier {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: MemoryTier::new(),
            fail_gets: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            put_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Put attempts observed, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> StoreError {
        StoreError::TierUnavailable {
            tier: self.name,
            message: "injected outage".to_string(),
        }
    }
}

#[async_trait]
impl JobTier for FlakyTier {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.get(id).await
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.put(job).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.list_ids().await
    }
}
