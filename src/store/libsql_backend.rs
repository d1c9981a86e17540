//! libSQL `JobStore` backend — job snapshots survive process restarts.
//!
//! Snapshots are stored as JSON with an integer epoch expiry; expired rows
//! read as absent. Pub/sub stays in-process (a channel registry identical
//! to the in-memory store's), so events are per-process and unpersisted —
//! the event stream's snapshot replay covers reconnects.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{RwLock, broadcast};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::events::JobEvent;
use crate::job::model::Job;
use crate::store::migrations;
use crate::store::traits::JobStore;

/// Capacity of each per-job broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// libSQL-backed job store. One connection, shared by all operations;
/// `libsql::Connection` handles concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    channels: RwLock<HashMap<Uuid, broadcast::Sender<JobEvent>>>,
}

impl LibSqlStore {
    /// Open a local database file, creating it and any pending schema
    /// versions as needed.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_db(db).await?;
        info!(path = %path.display(), "Job store opened");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_db(db).await
    }

    async fn from_db(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            channels: RwLock::new(HashMap::new()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Delete expired rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let removed = self
            .conn()
            .execute("DELETE FROM jobs WHERE expires_at <= ?1", params![now])
            .await
            .map_err(|e| StoreError::Query(format!("purge_expired: {e}")))?;
        Ok(removed as usize)
    }

    async fn sender(&self, job_id: Uuid) -> broadcast::Sender<JobEvent> {
        if let Some(tx) = self.channels.read().await.get(&job_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl JobStore for LibSqlStore {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let snapshot = serde_json::to_string(job)
            .map_err(|e| StoreError::Serialization(format!("put: {e}")))?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

        self.conn()
            .execute(
                "INSERT OR REPLACE INTO jobs (job_id, snapshot, expires_at) VALUES (?1, ?2, ?3)",
                params![job.job_id.to_string(), snapshot, expires_at],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put: {e}")))?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT snapshot, expires_at FROM jobs WHERE job_id = ?1",
                params![job_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let expires_at: i64 = row
                    .get(1)
                    .map_err(|e| StoreError::Query(format!("get expires_at: {e}")))?;
                if expires_at <= Utc::now().timestamp() {
                    return Ok(None);
                }
                let snapshot: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get snapshot: {e}")))?;
                let job: Job = serde_json::from_str(&snapshot)
                    .map_err(|e| StoreError::Serialization(format!("get: {e}")))?;
                Ok(Some(job))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    async fn publish(&self, job_id: Uuid, event: &JobEvent) -> Result<(), StoreError> {
        if let Some(tx) = self.channels.read().await.get(&job_id) {
            // Ok if no receivers are listening
            let _ = tx.send(event.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        self.sender(job_id).await.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::events::JobEventType;
    use crate::job::model::{JobMode, JobStatus};

    fn make_job() -> Job {
        Job::new("u1", JobMode::Reactive, Some("find papers".into()), None)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut job = make_job();
        job.merge_partial_output("summary", serde_json::json!("so far"));
        store.put(&job, Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.query.as_deref(), Some("find papers"));
        assert_eq!(fetched.partial_outputs, job.partial_outputs);
        assert_eq!(fetched.created_at, job.created_at);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_row_reads_as_absent() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let job = make_job();
        store.put(&job, Duration::ZERO).await.unwrap();
        assert!(store.get(job.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_snapshot() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut job = make_job();
        store.put(&job, Duration::from_secs(60)).await.unwrap();

        job.transition_to(JobStatus::Planning).unwrap();
        store.put(&job, Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Planning);
    }

    #[tokio::test]
    async fn purge_removes_expired_rows() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let live = make_job();
        let dead = make_job();
        store.put(&live, Duration::from_secs(60)).await.unwrap();
        store.put(&dead, Duration::ZERO).await.unwrap();

        let removed = store.purge_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(live.job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pubsub_works_alongside_persistence() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let job = make_job();
        let mut rx = store.subscribe(job.job_id).await;

        store
            .publish(job.job_id, &JobEvent::state_change(&job))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, JobEventType::StateChange);
    }

    #[tokio::test]
    async fn snapshots_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");
        let job = make_job();

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.put(&job, Duration::from_secs(60)).await.unwrap();
        }

        let reopened = LibSqlStore::new_local(&path).await.unwrap();
        let fetched = reopened.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, job.job_id);
    }
}
