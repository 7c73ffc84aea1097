//! Types for the catalog collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One downloadable file as enumerated by the catalog.
///
/// The display names are what end up in the archive layout; the ids used to
/// enumerate are never shown to users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogFile {
    /// Where to download the file from.
    pub source_url: String,
    /// Human-readable group name (e.g. the subject).
    pub group_name: String,
    /// Human-readable subgroup name (e.g. the exam season).
    pub subgroup_name: String,
    /// File name as presented by the catalog.
    pub file_name: String,
}

/// Errors that can occur enumerating catalog files.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog connection failed: {0}")]
    Connection(String),

    #[error("Catalog response could not be parsed: {0}")]
    Parse(String),

    #[error("Unknown group or subgroup: {group_id}/{subgroup_id}")]
    NotFound {
        group_id: String,
        subgroup_id: String,
    },

    #[error("Catalog internal error: {0}")]
    Internal(String),
}

/// Trait for catalog backends.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Enumerate the downloadable files of one subgroup, in catalog order.
    async fn enumerate_files(
        &self,
        group_id: &str,
        subgroup_id: &str,
    ) -> Result<Vec<CatalogFile>, CatalogError>;
}
