//! HTTP catalog client.
//!
//! Talks to the catalog service's JSON API. The service owns the actual
//! upstream scraping; from here it is just an endpoint that maps a
//! (group, subgroup) pair to a file listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::types::{Catalog, CatalogError, CatalogFile};
use crate::config::CatalogConfig;

/// Catalog backend consuming a remote catalog service.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

/// Wire format of the file listing endpoint.
#[derive(Debug, Deserialize)]
struct FileListingResponse {
    files: Vec<CatalogFile>,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn files_url(&self, group_id: &str, subgroup_id: &str) -> String {
        format!(
            "{}/groups/{}/subgroups/{}/files",
            self.base_url,
            urlencoding::encode(group_id),
            urlencoding::encode(subgroup_id)
        )
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    fn name(&self) -> &str {
        "http"
    }

    async fn enumerate_files(
        &self,
        group_id: &str,
        subgroup_id: &str,
    ) -> Result<Vec<CatalogFile>, CatalogError> {
        let url = self.files_url(group_id, subgroup_id);
        debug!("Enumerating catalog files from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Connection(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CatalogError::NotFound {
                group_id: group_id.to_string(),
                subgroup_id: subgroup_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CatalogError::Internal(format!("HTTP {}", status.as_u16())));
        }

        let listing: FileListingResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        Ok(listing.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_url_encodes_ids() {
        let catalog = HttpCatalog::new(&CatalogConfig {
            base_url: "http://catalog:9200/".to_string(),
            timeout_secs: 5,
        });
        assert_eq!(
            catalog.files_url("as-and-a-level", "june 2024"),
            "http://catalog:9200/groups/as-and-a-level/subgroups/june%202024/files"
        );
    }
}
