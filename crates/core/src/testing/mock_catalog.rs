//! Mock catalog for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::{Catalog, CatalogError, CatalogFile};

/// Mock implementation of the [`Catalog`] trait.
///
/// Subgroups must be configured explicitly: an unconfigured
/// (group, subgroup) pair fails with `NotFound`, and pairs marked failing
/// fail with `Connection`, which lets tests exercise the per-subgroup
/// soft-failure path.
pub struct MockCatalog {
    files: Arc<RwLock<HashMap<(String, String), Vec<CatalogFile>>>>,
    failing: Arc<RwLock<HashSet<(String, String)>>>,
    calls: Arc<RwLock<Vec<(String, String)>>>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Configure the enumeration result of one subgroup.
    pub async fn set_files(&self, group_id: &str, subgroup_id: &str, files: Vec<CatalogFile>) {
        self.files
            .write()
            .await
            .insert((group_id.to_string(), subgroup_id.to_string()), files);
    }

    /// Make one subgroup fail with a connection error.
    pub async fn fail_subgroup(&self, group_id: &str, subgroup_id: &str) {
        self.failing
            .write()
            .await
            .insert((group_id.to_string(), subgroup_id.to_string()));
    }

    /// Every (group, subgroup) pair enumerated so far, in call order.
    pub async fn recorded_calls(&self) -> Vec<(String, String)> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn enumerate_files(
        &self,
        group_id: &str,
        subgroup_id: &str,
    ) -> Result<Vec<CatalogFile>, CatalogError> {
        let key = (group_id.to_string(), subgroup_id.to_string());
        self.calls.write().await.push(key.clone());

        if self.failing.read().await.contains(&key) {
            return Err(CatalogError::Connection("injected failure".to_string()));
        }

        match self.files.read().await.get(&key) {
            Some(files) => Ok(files.clone()),
            None => Err(CatalogError::NotFound {
                group_id: group_id.to_string(),
                subgroup_id: subgroup_id.to_string(),
            }),
        }
    }
}
