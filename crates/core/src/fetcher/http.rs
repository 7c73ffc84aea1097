//! HTTP fetcher backed by reqwest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use super::types::{FetchError, FetchErrorKind, FetchRequest, Fetched, Fetcher, RetryPolicy};

/// Failure of a single attempt, before the retry policy has decided.
struct AttemptError {
    kind: FetchErrorKind,
    transient: bool,
    message: String,
}

/// Map a non-success HTTP status to an error kind and retryability.
///
/// 5xx and throttling statuses are transient; client-class statuses are
/// terminal after a single attempt.
pub(crate) fn classify_status(status: u16) -> (FetchErrorKind, bool) {
    match status {
        404 | 410 => (FetchErrorKind::NotFound, false),
        408 => (FetchErrorKind::Timeout, true),
        429 => (FetchErrorKind::Network, true),
        s if s >= 500 => (FetchErrorKind::Network, true),
        _ => (FetchErrorKind::Network, false),
    }
}

/// Production [`Fetcher`] that downloads over HTTP(S) with per-attempt
/// timeouts and atomic staging writes.
pub struct HttpFetcher {
    client: Client,
    attempt_timeout: Duration,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-attempt timeout and retry policy.
    pub fn new(attempt_timeout: Duration, policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            attempt_timeout,
            policy,
        }
    }

    /// Run one attempt: request, stream the body to a temp file, rename.
    async fn attempt(&self, url: &Url, dest: &Path) -> Result<u64, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.attempt_timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let (kind, transient) = classify_status(status.as_u16());
            return Err(AttemptError {
                kind,
                transient,
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(filesystem_error)?;
        }

        // Half-written downloads must never be visible under the final name.
        let tmp_path = temp_path_for(dest);
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(filesystem_error)?;

        let mut bytes_written: u64 = 0;
        let mut stream = response.bytes_stream();
        let stream_result = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = file.write_all(&chunk).await {
                        break Err(filesystem_error(e));
                    }
                    bytes_written += chunk.len() as u64;
                }
                Some(Err(e)) => break Err(classify_reqwest_error(e)),
                None => break Ok(()),
            }
        };

        if let Err(e) = stream_result {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        file.flush().await.map_err(filesystem_error)?;
        drop(file);

        tokio::fs::rename(&tmp_path, dest)
            .await
            .map_err(filesystem_error)?;

        Ok(bytes_written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: FetchRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Fetched, FetchError> {
        // Malformed URLs fail without consuming a network attempt.
        let url = Url::parse(&request.source_url).map_err(|e| FetchError::MalformedUrl {
            url: request.source_url.clone(),
            message: e.to_string(),
        })?;

        let mut attempt: u32 = 0;
        loop {
            if *cancel.borrow() {
                return Err(FetchError::Cancelled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                outcome = self.attempt(&url, &request.dest_path) => outcome,
                _ = cancel.changed() => {
                    debug!("Fetch of {} abandoned by cancellation", url);
                    return Err(FetchError::Cancelled);
                }
            };

            let err = match outcome {
                Ok(bytes) => {
                    return Ok(Fetched {
                        bytes,
                        attempts: attempt,
                    })
                }
                Err(err) => err,
            };

            if err.transient && self.policy.allows_retry(attempt) {
                let delay = self.policy.backoff(attempt, request.source_url.as_str());
                debug!(
                    "Attempt {} for {} failed ({}), retrying in {:?}",
                    attempt, url, err.message, delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.changed() => return Err(FetchError::Cancelled),
                }
                continue;
            }

            warn!(
                "Fetch of {} failed ({}) after {} attempt(s): {}",
                url, err.kind, attempt, err.message
            );
            return Err(FetchError::Failed {
                kind: err.kind,
                attempts: attempt,
                message: err.message,
            });
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> AttemptError {
    let kind = if e.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Network
    };
    AttemptError {
        kind,
        transient: true,
        message: e.to_string(),
    }
}

fn filesystem_error(e: std::io::Error) -> AttemptError {
    AttemptError {
        kind: FetchErrorKind::Filesystem,
        transient: false,
        message: e.to_string(),
    }
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!(".{}.part", file_name))
}
