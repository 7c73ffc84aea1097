//! Types for the file fetcher.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Classification of a failed fetch, persisted on the file task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Connection-level failure or a non-retryable HTTP status.
    Network,
    /// The attempt exceeded its time limit.
    Timeout,
    /// The origin reported the resource gone (404/410).
    NotFound,
    /// Staging storage could not be written.
    Filesystem,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::Filesystem => "filesystem",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur fetching a single file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed validation; no network attempt was consumed.
    #[error("malformed URL {url}: {message}")]
    MalformedUrl { url: String, message: String },

    /// Terminal failure after the recorded number of attempts.
    #[error("fetch failed ({kind}) after {attempts} attempt(s): {message}")]
    Failed {
        kind: FetchErrorKind,
        attempts: u32,
        message: String,
    },

    /// The owning job was cancelled while the fetch was pending or in flight.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// The error kind to record on the file task.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::MalformedUrl { .. } => FetchErrorKind::Network,
            FetchError::Failed { kind, .. } => *kind,
            FetchError::Cancelled => FetchErrorKind::Network,
        }
    }

    /// Network attempts consumed before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Input for a single fetch operation.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Where to download from.
    pub source_url: String,
    /// Final staging path. The fetcher writes to a temporary sibling and
    /// renames on success so a half-written file is never visible here.
    pub dest_path: PathBuf,
}

/// Successful fetch result.
#[derive(Debug, Clone, Copy)]
pub struct Fetched {
    /// Bytes written to the staging file.
    pub bytes: u64,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
}

/// Trait for file download backends.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one file to its staging path.
    ///
    /// The watch receiver carries the owning job's cancellation flag; an
    /// implementation checks it at every suspension point and returns
    /// [`FetchError::Cancelled`] rather than completing.
    async fn fetch(
        &self,
        request: FetchRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<Fetched, FetchError>;
}

/// Exponential backoff policy with a deterministic jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` attempts (1-based).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff before the attempt following `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` capped at `max_delay`, plus a jitter of up to
    /// half the base delay derived from hashing `seed` with the attempt, so
    /// concurrent fetchers against the same origin do not retry in lockstep.
    pub fn backoff(&self, attempt: u32, seed: &str) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        let raw = self.base_delay.saturating_mul(exp).min(self.max_delay);

        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        attempt.hash(&mut hasher);
        let jitter_span = (self.base_delay.as_millis() as u64 / 2).max(1);
        let jitter = Duration::from_millis(hasher.finish() % jitter_span);

        (raw + jitter).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        let d1 = policy.backoff(1, "u");
        let d2 = policy.backoff(2, "u");
        let d3 = policy.backoff(3, "u");
        assert!(d2 >= d1);
        assert!(d3 >= d2);
        assert!(policy.backoff(9, "u") <= Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_jitter_is_deterministic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(2, "same"), policy.backoff(2, "same"));
    }

    #[test]
    fn test_retry_attempt_limit() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_error_kind_accessors() {
        let err = FetchError::Failed {
            kind: FetchErrorKind::Timeout,
            attempts: 3,
            message: "deadline exceeded".to_string(),
        };
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
        assert_eq!(err.attempts(), 3);

        let err = FetchError::MalformedUrl {
            url: "not a url".to_string(),
            message: "relative URL without a base".to_string(),
        };
        assert_eq!(err.attempts(), 0);
    }
}
