//! Read-through/write-through composition of the three tiers.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::types::{JobTier, StoreError};
use crate::job::Job;

/// The tiered job store.
///
/// Reads consult fast, then durable, then fallback, stopping at the first
/// hit; a lower-tier hit is promoted into the fast tier as a cache fill.
/// Writes go through every applicable tier; a durable-tier failure degrades
/// to the fallback tier without failing the operation.
pub struct TieredJobStore {
    fast: Arc<dyn JobTier>,
    durable: Option<Arc<dyn JobTier>>,
    fallback: Arc<dyn JobTier>,
    /// Serializes all mutations. Counter updates are expressed as
    /// read-modify-write under this lock, never as blind overwrites, so two
    /// concurrent completions cannot erase each other's increments.
    write_lock: Mutex<()>,
}

impl TieredJobStore {
    pub fn new(
        fast: Arc<dyn JobTier>,
        durable: Option<Arc<dyn JobTier>>,
        fallback: Arc<dyn JobTier>,
    ) -> Self {
        Self {
            fast,
            durable,
            fallback,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the freshest available record.
    ///
    /// `Err(NotFound)` means the job exists in no tier, which is distinct
    /// from any empty or zero-valued record.
    pub async fn get(&self, id: &str) -> Result<Job, StoreError> {
        if let Some(job) = self.read_tier(self.fast.as_ref(), id).await {
            return Ok(job);
        }

        for tier in self.lower_tiers() {
            if let Some(job) = self.read_tier(tier.as_ref(), id).await {
                // Cache fill; a failed promotion costs latency, not
                // correctness.
                if let Err(e) = self.fast.put(&job).await {
                    warn!("Promotion of job {} into fast tier failed: {}", id, e);
                }
                return Ok(job);
            }
        }

        Err(StoreError::NotFound(id.to_string()))
    }

    /// Persist a brand-new record through every applicable tier.
    pub async fn create(&self, job: Job) -> Result<Job, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_through(&job).await;
        Ok(job)
    }

    /// Apply one mutation as an atomic read-modify-write.
    ///
    /// The closure sees the freshest record; the store bumps `revision` and
    /// `updated_at` and writes through. This is the only mutation path.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let _guard = self.write_lock.lock().await;

        let mut job = self.read_freshest(id).await?;
        mutate(&mut job);
        job.revision += 1;
        job.updated_at = Utc::now();

        self.write_through(&job).await;
        Ok(job)
    }

    /// Delete a job from every tier. Idempotent and best-effort.
    pub async fn delete(&self, id: &str) {
        let _guard = self.write_lock.lock().await;
        for tier in self.all_tiers() {
            if let Err(e) = tier.delete(id).await {
                warn!("Delete of job {} from {} tier failed: {}", id, tier.name(), e);
            }
        }
    }

    /// Union of job ids across all tiers, for the reaper's sweep.
    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids = BTreeSet::new();
        for tier in self.all_tiers() {
            match tier.list_ids().await {
                Ok(tier_ids) => ids.extend(tier_ids),
                Err(e) => warn!("Listing {} tier failed: {}", tier.name(), e),
            }
        }
        ids.into_iter().collect()
    }

    async fn read_freshest(&self, id: &str) -> Result<Job, StoreError> {
        if let Some(job) = self.read_tier(self.fast.as_ref(), id).await {
            return Ok(job);
        }
        for tier in self.lower_tiers() {
            if let Some(job) = self.read_tier(tier.as_ref(), id).await {
                return Ok(job);
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn read_tier(&self, tier: &dyn JobTier, id: &str) -> Option<Job> {
        match tier.get(id).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Read of job {} from {} tier failed: {}", id, tier.name(), e);
                None
            }
        }
    }

    /// Write one record through the tiers in fixed order.
    ///
    /// The fallback tier is only written while the durable tier is
    /// unavailable, so it never shadows a healthy durable tier as the
    /// source of truth.
    async fn write_through(&self, job: &Job) {
        if let Err(e) = self.fast.put(job).await {
            warn!("Fast-tier write of job {} failed: {}", job.id, e);
        }

        match &self.durable {
            Some(durable) => match durable.put(job).await {
                Ok(()) => {
                    debug!("Job {} written through durable tier", job.id);
                }
                Err(e) => {
                    warn!(
                        "Durable tier unavailable for job {} ({}), degrading to fallback",
                        job.id, e
                    );
                    crate::metrics::STORE_DEGRADATIONS.inc();
                    self.write_fallback(job).await;
                }
            },
            None => self.write_fallback(job).await,
        }
    }

    async fn write_fallback(&self, job: &Job) {
        if let Err(e) = self.fallback.put(job).await {
            warn!("Fallback-tier write of job {} failed: {}", job.id, e);
        }
    }

    fn lower_tiers(&self) -> impl Iterator<Item = &Arc<dyn JobTier>> {
        self.durable.iter().chain(std::iter::once(&self.fallback))
    }

    fn all_tiers(&self) -> impl Iterator<Item = &Arc<dyn JobTier>> {
        std::iter::once(&self.fast)
            .chain(self.durable.iter())
            .chain(std::iter::once(&self.fallback))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::fetcher::FetchErrorKind;
    use crate::job::{FileTask, JobStatus};
    use crate::store::MemoryTier;
    use crate::testing::FlakyTier;

    struct Tiers {
        fast: Arc<MemoryTier>,
        durable: Arc<FlakyTier>,
        fallback: Arc<MemoryTier>,
        store: TieredJobStore,
    }

    fn store_with_tiers() -> Tiers {
        let fast = Arc::new(MemoryTier::new());
        let durable = Arc::new(FlakyTier::new("durable"));
        let fallback = Arc::new(MemoryTier::new());
        let store = TieredJobStore::new(
            Arc::clone(&fast) as Arc<dyn JobTier>,
            Some(Arc::clone(&durable) as Arc<dyn JobTier>),
            Arc::clone(&fallback) as Arc<dyn JobTier>,
        );
        Tiers {
            fast,
            durable,
            fallback,
            store,
        }
    }

    fn job_with_tasks(id: &str, count: usize) -> Job {
        let mut job = Job::new(id, vec![]);
        let mut files = BTreeMap::new();
        for i in 0..count {
            let key = format!("Group/Sub/file-{:02}.pdf", i);
            files.insert(key.clone(), FileTask::pending(format!("http://x/{}", i), key));
        }
        job.set_files(files);
        job.status = JobStatus::Fetching;
        job
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let tiers = store_with_tiers();
        let result = tiers.store.get("nope").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lower_tier_hit_is_promoted() {
        let tiers = store_with_tiers();
        let job = Job::new("job-1", vec![]);
        tiers.fallback.put(&job).await.unwrap();

        assert!(tiers.fast.get("job-1").await.unwrap().is_none());
        let loaded = tiers.store.get("job-1").await.unwrap();
        assert_eq!(loaded.id, "job-1");
        // Cache fill happened.
        assert!(tiers.fast.get("job-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_bumps_revision_and_writes_durable() {
        let tiers = store_with_tiers();
        tiers.store.create(job_with_tasks("job-1", 2)).await.unwrap();

        let updated = tiers
            .store
            .update("job-1", |job| {
                job.mark_task_done("Group/Sub/file-00.pdf", 1, 100);
            })
            .await
            .unwrap();

        assert_eq!(updated.revision, 1);
        assert_eq!(updated.completed_count, 1);
        // Durable tier healthy: record is there, fallback untouched.
        assert_eq!(
            tiers.durable.get("job-1").await.unwrap().unwrap().revision,
            1
        );
        assert!(tiers.fallback.get("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_durable_outage_degrades_to_fallback_without_losing_update() {
        let tiers = store_with_tiers();
        tiers.store.create(job_with_tasks("job-1", 2)).await.unwrap();
        tiers.durable.set_fail_puts(true);

        tiers
            .store
            .update("job-1", |job| {
                job.mark_task_done("Group/Sub/file-00.pdf", 1, 100);
            })
            .await
            .unwrap();

        // The update landed in the fallback tier with the same counters.
        let fallback_copy = tiers.fallback.get("job-1").await.unwrap().unwrap();
        assert_eq!(fallback_copy.completed_count, 1);

        // A replacement process (empty fast tier, durable still down) can
        // still read the record.
        let restarted = TieredJobStore::new(
            Arc::new(MemoryTier::new()) as Arc<dyn JobTier>,
            Some(Arc::clone(&tiers.durable) as Arc<dyn JobTier>),
            Arc::clone(&tiers.fallback) as Arc<dyn JobTier>,
        );
        tiers.durable.set_fail_gets(true);
        let recovered = restarted.get("job-1").await.unwrap();
        assert_eq!(recovered.completed_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_completions_lose_no_updates() {
        let count = 24;
        let tiers = store_with_tiers();
        let store = Arc::new(tiers.store);
        store.create(job_with_tasks("job-1", count)).await.unwrap();

        // Inject completions from concurrent tasks with staggered delays so
        // the arrival order varies from the submission order.
        let mut handles = Vec::new();
        for i in 0..count {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(((i * 7) % 5) as u64)).await;
                let key = format!("Group/Sub/file-{:02}.pdf", i);
                store
                    .update("job-1", |job| {
                        if i % 3 == 0 {
                            job.mark_task_failed(&key, 3, FetchErrorKind::Network);
                        } else {
                            job.mark_task_done(&key, 1, 10);
                        }
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let job = store.get("job-1").await.unwrap();
        assert_eq!(
            job.completed_count + job.failed_count,
            job.total_count,
            "every completion must increment exactly one counter"
        );
        assert_eq!(job.total_count as usize, count);
        assert_eq!(job.revision, count as u64);
    }

    #[tokio::test]
    async fn test_delete_removes_all_tiers_and_is_idempotent() {
        let tiers = store_with_tiers();
        tiers.store.create(Job::new("job-1", vec![])).await.unwrap();
        tiers
            .fallback
            .put(&Job::new("job-1", vec![]))
            .await
            .unwrap();

        tiers.store.delete("job-1").await;
        assert!(tiers.fast.get("job-1").await.unwrap().is_none());
        assert!(tiers.durable.get("job-1").await.unwrap().is_none());
        assert!(tiers.fallback.get("job-1").await.unwrap().is_none());

        // Deleting again is a no-op.
        tiers.store.delete("job-1").await;
        assert!(matches!(
            tiers.store.get("job-1").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_ids_unions_tiers() {
        let tiers = store_with_tiers();
        tiers.store.create(Job::new("a", vec![])).await.unwrap();
        tiers.fallback.put(&Job::new("b", vec![])).await.unwrap();

        let ids = tiers.store.list_ids().await;
        assert_eq!(ids, vec!["a", "b"]);
    }
}
