//! Single-file download with timeout, retry and atomic staging writes.
//!
//! The [`Fetcher`] trait is the seam between the orchestrator and the
//! network; [`HttpFetcher`] is the production implementation. Retries apply
//! only to transient conditions (connection failures, timeouts, 5xx), with
//! exponential backoff between attempts.

mod http;
mod types;

pub use http::HttpFetcher;
pub use types::{FetchError, FetchErrorKind, FetchRequest, Fetched, Fetcher, RetryPolicy};
