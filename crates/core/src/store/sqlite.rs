//! SQLite-backed fallback tier.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::types::{JobTier, StoreError};
use crate::job::Job;

/// Durable local tier. Only the write of last resort: the tiered store
/// writes here when the durable tier is unreachable, and reads here last.
pub struct SqliteTier {
    conn: Mutex<Connection>,
}

impl SqliteTier {
    /// Open (or create) the database file and its schema.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, useful for testing.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JobTier for SqliteTier {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT record FROM jobs WHERE id = ?")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut rows = stmt
            .query(params![id])
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match rows.next().map_err(|e| StoreError::Database(e.to_string()))? {
            Some(row) => {
                let record: String = row
                    .get(0)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let job: Job = serde_json::from_str(&record)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let record =
            serde_json::to_string(job).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO jobs (id, record, updated_at) VALUES (?, ?, ?)",
            params![job.id, record, job.updated_at.to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute("DELETE FROM jobs WHERE id = ?", params![id])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT id FROM jobs ORDER BY updated_at")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_sqlite() {
        let tier = SqliteTier::in_memory().unwrap();
        let mut job = Job::new("job-1", vec![]);
        job.revision = 7;

        tier.put(&job).await.unwrap();
        let loaded = tier.get("job-1").await.unwrap().unwrap();
        assert_eq!(loaded, job);

        tier.delete("job-1").await.unwrap();
        assert!(tier.get("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_previous_revision() {
        let tier = SqliteTier::in_memory().unwrap();
        let mut job = Job::new("job-1", vec![]);
        tier.put(&job).await.unwrap();

        job.revision = 3;
        tier.put(&job).await.unwrap();
        assert_eq!(tier.get("job-1").await.unwrap().unwrap().revision, 3);
        assert_eq!(tier.list_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        {
            let tier = SqliteTier::new(&path).unwrap();
            tier.put(&Job::new("job-1", vec![])).await.unwrap();
        }
        let tier = SqliteTier::new(&path).unwrap();
        assert!(tier.get("job-1").await.unwrap().is_some());
    }
}
