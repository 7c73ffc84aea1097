//! Durable remote key-value tier.
//!
//! Client for an external KV service exposing `GET/PUT/DELETE /jobs/{id}`
//! and `GET /jobs` (id listing). Every write is verified by an immediate
//! read-back comparing the record revision; a failed round-trip surfaces as
//! `TierUnavailable` and the tiered store degrades to the fallback tier for
//! that write.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::types::{JobTier, StoreError};
use crate::job::Job;

const TIER_NAME: &str = "durable";

/// Remote KV tier backed by an HTTP service.
pub struct RemoteKvTier {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdListing {
    ids: Vec<String>,
}

impl RemoteKvTier {
    /// Create a client for the service at `base_url`, optionally sending a
    /// bearer token with every request.
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn job_url(&self, id: &str) -> String {
        format!("{}/jobs/{}", self.base_url, urlencoding::encode(id))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn unavailable(message: impl Into<String>) -> StoreError {
        StoreError::TierUnavailable {
            tier: TIER_NAME,
            message: message.into(),
        }
    }
}

#[async_trait]
impl JobTier for RemoteKvTier {
    fn name(&self) -> &'static str {
        TIER_NAME
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let response = self
            .request(self.client.get(self.job_url(id)))
            .send()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let job: Job = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(job))
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let response = self
            .request(self.client.put(self.job_url(&job.id)).json(job))
            .send()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        // The write is only trusted once the service echoes the revision
        // back; the service may be written from another process instance.
        let stored = self.get(&job.id).await?;
        match stored {
            Some(stored) if stored.revision == job.revision => {
                debug!(
                    "Durable write of job {} verified at revision {}",
                    job.id, job.revision
                );
                Ok(())
            }
            Some(stored) => Err(Self::unavailable(format!(
                "read-back revision mismatch: wrote {}, read {}",
                job.revision, stored.revision
            ))),
            None => Err(Self::unavailable("read-back returned no record")),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .request(self.client.delete(self.job_url(id)))
            .send()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        // 404 means it was already gone; deletion is idempotent.
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(Self::unavailable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .request(self.client.get(format!("{}/jobs", self.base_url)))
            .send()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::unavailable(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let listing: IdListing = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(listing.ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_url_encodes_id() {
        let tier = RemoteKvTier::new("http://kv:7700/", None, 5);
        assert_eq!(tier.job_url("a b"), "http://kv:7700/jobs/a%20b");
    }
}
