//! Mock fetcher for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use crate::fetcher::{FetchError, FetchErrorKind, FetchRequest, Fetched, Fetcher};

/// What a [`MockFetcher`] should do for one URL.
#[derive(Debug, Clone)]
pub enum MockFetchOutcome {
    /// Write `body` to the staging path and report success.
    Success { body: Vec<u8> },
    /// Fail terminally with the given kind after `attempts` attempts.
    Fail {
        kind: FetchErrorKind,
        attempts: u32,
    },
}

/// Mock implementation of the [`Fetcher`] trait.
///
/// By default every fetch succeeds and writes a small placeholder body to
/// the staging path, so assembly finds real files. Outcomes can be
/// overridden per URL, and an artificial delay makes in-flight cancellation
/// testable.
pub struct MockFetcher {
    outcomes: Arc<RwLock<HashMap<String, MockFetchOutcome>>>,
    delay: Arc<RwLock<Duration>>,
    fetched: Arc<RwLock<Vec<String>>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(HashMap::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            fetched: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Override the outcome for one URL.
    pub async fn set_outcome(&self, url: &str, outcome: MockFetchOutcome) {
        self.outcomes.write().await.insert(url.to_string(), outcome);
    }

    /// Delay every fetch, to hold fetchers in flight.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// URLs fetched so far, in completion order.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetched.read().await.len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        request: FetchRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Fetched, FetchError> {
        if *cancel.borrow() {
            return Err(FetchError::Cancelled);
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => return Err(FetchError::Cancelled),
            }
        }

        self.fetched
            .write()
            .await
            .push(request.source_url.clone());

        let outcome = self
            .outcomes
            .read()
            .await
            .get(&request.source_url)
            .cloned()
            .unwrap_or(MockFetchOutcome::Success {
                body: b"mock file body".to_vec(),
            });

        match outcome {
            MockFetchOutcome::Success { body } => {
                if let Some(parent) = request.dest_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| FetchError::Failed {
                            kind: FetchErrorKind::Filesystem,
                            attempts: 1,
                            message: e.to_string(),
                        })?;
                }
                tokio::fs::write(&request.dest_path, &body)
                    .await
                    .map_err(|e| FetchError::Failed {
                        kind: FetchErrorKind::Filesystem,
                        attempts: 1,
                        message: e.to_string(),
                    })?;
                Ok(Fetched {
                    bytes: body.len() as u64,
                    attempts: 1,
                })
            }
            MockFetchOutcome::Fail { kind, attempts } => Err(FetchError::Failed {
                kind,
                attempts,
                message: "injected failure".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_outcome_writes_staging_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        let (_tx, rx) = watch::channel(false);

        let dest = dir.path().join("Math/June 2024/p1.pdf");
        let fetched = fetcher
            .fetch(
                FetchRequest {
                    source_url: "http://x/p1.pdf".to_string(),
                    dest_path: dest.clone(),
                },
                rx,
            )
            .await
            .unwrap();

        assert!(dest.is_file());
        assert_eq!(fetched.bytes, 14);
        assert_eq!(fetcher.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let fetcher = MockFetcher::new();
        fetcher
            .set_outcome(
                "http://x/gone.pdf",
                MockFetchOutcome::Fail {
                    kind: FetchErrorKind::NotFound,
                    attempts: 1,
                },
            )
            .await;
        let (_tx, rx) = watch::channel(false);

        let result = fetcher
            .fetch(
                FetchRequest {
                    source_url: "http://x/gone.pdf".to_string(),
                    dest_path: "/tmp/unused".into(),
                },
                rx,
            )
            .await;
        match result {
            Err(FetchError::Failed { kind, .. }) => assert_eq!(kind, FetchErrorKind::NotFound),
            other => panic!("Expected injected failure, got {:?}", other.map(|f| f.bytes)),
        }
    }

    #[tokio::test]
    async fn test_delayed_fetch_honours_cancellation() {
        let fetcher = MockFetcher::new();
        fetcher.set_delay(Duration::from_secs(30)).await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            async move {
                fetcher
                    .fetch(
                        FetchRequest {
                            source_url: "http://x/slow.pdf".to_string(),
                            dest_path: "/tmp/unused".into(),
                        },
                        rx,
                    )
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
