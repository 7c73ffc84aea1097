//! Process-wide admission gate for concurrent fetchers.
//!
//! The bound is shared across all active jobs so the origin server sees a
//! single aggregate load ceiling, not one per job. Admission is FIFO via the
//! semaphore; a minimum inter-request spacing composes with the bound to
//! keep request bursts polite toward the origin.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Snapshot of the governor's shared state.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    /// Configured concurrency bound.
    pub max_concurrent: usize,
    /// Permits currently free.
    pub available_permits: usize,
    /// Configured inter-request spacing in milliseconds.
    pub request_spacing_ms: u64,
}

/// Bounded-admission gate with a politeness clock.
pub struct Governor {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    spacing: Duration,
    /// Earliest instant the next admitted fetcher may dispatch. The only
    /// state shared across jobs besides the semaphore itself.
    next_dispatch: Mutex<Instant>,
}

impl Governor {
    /// Create a governor admitting at most `max_concurrent` fetchers with at
    /// least `spacing` between consecutive dispatches.
    pub fn new(max_concurrent: usize, spacing: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            spacing,
            next_dispatch: Mutex::new(Instant::now()),
        }
    }

    /// Wait for admission, honouring the cancellation flag.
    ///
    /// Returns `None` when the job was cancelled while queued; the caller
    /// must not dispatch. The returned permit releases its slot on drop.
    pub async fn admit(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<OwnedSemaphorePermit> {
        if *cancel.borrow() {
            return None;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.expect("governor semaphore closed")
            }
            _ = cancel.changed() => return None,
        };

        // Reserve a dispatch slot, then sleep outside the lock so queued
        // admissions stack their spacing instead of serializing on it.
        let dispatch_at = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();
            let at = (*next).max(now);
            *next = at + self.spacing;
            at
        };

        tokio::select! {
            _ = tokio::time::sleep_until(dispatch_at) => Some(permit),
            _ = cancel.changed() => None,
        }
    }

    /// Current shared-state snapshot.
    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            max_concurrent: self.max_concurrent,
            available_permits: self.semaphore.available_permits(),
            request_spacing_ms: self.spacing.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let governor = Arc::new(Governor::new(2, Duration::ZERO));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let governor = Arc::clone(&governor);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let (_cancel_tx, mut cancel) = watch::channel(false);
                let _permit = governor.admit(&mut cancel).await.expect("admitted");
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_spacing_delays_consecutive_dispatches() {
        let governor = Governor::new(4, Duration::from_millis(25));
        let (_cancel_tx, mut cancel) = watch::channel(false);
        let started = Instant::now();
        for _ in 0..3 {
            let _permit = governor.admit(&mut cancel).await.expect("admitted");
        }
        // Third dispatch cannot happen before two spacing intervals elapsed.
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cancelled_admission_returns_none() {
        let governor = Arc::new(Governor::new(1, Duration::ZERO));
        let (_held_tx, mut held_cancel) = watch::channel(false);
        let held = governor.admit(&mut held_cancel).await.expect("admitted");

        let (tx, mut rx) = watch::channel(false);
        let waiter = {
            let governor = Arc::clone(&governor);
            tokio::spawn(async move { governor.admit(&mut rx).await.is_none() })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).expect("receiver alive");
        assert!(waiter.await.expect("task panicked"));
        drop(held);
    }

    #[tokio::test]
    async fn test_status_reports_permits() {
        let governor = Governor::new(3, Duration::ZERO);
        let status = governor.status();
        assert_eq!(status.max_concurrent, 3);
        assert_eq!(status.available_permits, 3);

        let (_cancel_tx, mut cancel) = watch::channel(false);
        let _permit = governor.admit(&mut cancel).await.expect("admitted");
        assert_eq!(governor.status().available_permits, 2);
    }
}
