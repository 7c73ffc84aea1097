//! Background reclamation of expired jobs.
//!
//! A job untouched for longer than the configured time-to-live is deleted
//! from every store tier together with its staged files and archive. The
//! sweep runs on an interval and is also invoked on demand before each job
//! creation. Deletion is best-effort and idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::assembler::Assembler;
use crate::config::ReaperConfig;
use crate::metrics;
use crate::store::{StoreError, TieredJobStore};

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    /// Job records examined.
    pub scanned: usize,
    /// Jobs deleted.
    pub removed: usize,
}

/// Deletes jobs whose `updated_at` exceeds the time-to-live.
pub struct Reaper {
    store: Arc<TieredJobStore>,
    assembler: Arc<Assembler>,
    ttl: chrono::Duration,
    sweep_interval: Duration,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Reaper {
    pub fn new(
        store: Arc<TieredJobStore>,
        assembler: Arc<Assembler>,
        config: &ReaperConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            assembler,
            ttl: chrono::Duration::seconds(config.ttl_secs as i64),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start the periodic sweep task.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reaper already running");
            return;
        }

        let this = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            info!("Reaper started (ttl {}s)", this.ttl.num_seconds());
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reaper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(this.sweep_interval) => {
                        if !this.running.load(Ordering::Relaxed) {
                            break;
                        }
                        this.sweep_once().await;
                    }
                }
            }
            info!("Reaper stopped");
        });
    }

    /// Stop the periodic sweep task.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Scan every tier and delete jobs past the time-to-live.
    pub async fn sweep_once(&self) -> SweepStats {
        let cutoff = Utc::now() - self.ttl;
        let ids = self.store.list_ids().await;
        let mut stats = SweepStats {
            scanned: ids.len(),
            removed: 0,
        };

        for id in &ids {
            match self.store.get(id).await {
                Ok(job) if job.updated_at < cutoff => {
                    debug!("Reaping job {} (idle since {})", id, job.updated_at);
                    self.store.delete(id).await;
                    self.assembler.remove_job_files(id).await;
                    metrics::JOBS_REAPED.inc();
                    stats.removed += 1;
                }
                Ok(_) => {}
                // Already gone: reaping is idempotent.
                Err(StoreError::NotFound(_)) => {}
                Err(e) => warn!("Reaper could not read job {}: {}", id, e),
            }
        }

        if stats.removed > 0 {
            info!("Reaped {} expired job(s)", stats.removed);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::ReaperConfig;
    use crate::job::Job;
    use crate::store::{JobTier, MemoryTier, TieredJobStore};

    fn test_store() -> Arc<TieredJobStore> {
        Arc::new(TieredJobStore::new(
            Arc::new(MemoryTier::new()) as Arc<dyn JobTier>,
            None,
            Arc::new(MemoryTier::new()) as Arc<dyn JobTier>,
        ))
    }

    fn reaper_with(staging: &TempDir, store: Arc<TieredJobStore>) -> Reaper {
        Reaper::new(
            Arc::clone(&store),
            Arc::new(Assembler::new(staging.path())),
            &ReaperConfig {
                ttl_secs: 3600,
                sweep_interval_secs: 300,
            },
        )
    }

    #[tokio::test]
    async fn test_expired_job_is_reaped_with_its_files() {
        let staging = TempDir::new().unwrap();
        let store = test_store();
        let reaper = reaper_with(&staging, Arc::clone(&store));

        let mut expired = Job::new("old", vec![]);
        expired.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.create(expired).await.unwrap();

        let staged = staging.path().join("old/Math/paper.pdf");
        std::fs::create_dir_all(staged.parent().unwrap()).unwrap();
        std::fs::write(&staged, b"data").unwrap();
        std::fs::write(staging.path().join("old.zip"), b"zip").unwrap();

        let stats = reaper.sweep_once().await;
        assert_eq!(stats.removed, 1);
        assert!(store.get("old").await.is_err());
        assert!(!staging.path().join("old").exists());
        assert!(!staging.path().join("old.zip").exists());
    }

    #[tokio::test]
    async fn test_fresh_job_survives_sweep() {
        let staging = TempDir::new().unwrap();
        let store = test_store();
        let reaper = reaper_with(&staging, Arc::clone(&store));

        store.create(Job::new("fresh", vec![])).await.unwrap();

        let stats = reaper.sweep_once().await;
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.removed, 0);
        assert!(store.get("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let staging = TempDir::new().unwrap();
        let store = test_store();
        let reaper = reaper_with(&staging, Arc::clone(&store));

        let mut expired = Job::new("old", vec![]);
        expired.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.create(expired).await.unwrap();

        assert_eq!(reaper.sweep_once().await.removed, 1);
        assert_eq!(reaper.sweep_once().await.removed, 0);
    }
}
