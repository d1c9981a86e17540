//! In-memory `JobStore` — expiring snapshot map plus broadcast channels.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::events::JobEvent;
use crate::job::model::Job;
use crate::store::traits::JobStore;

/// Capacity of each per-job broadcast channel. Slow subscribers past this
/// lag skip events rather than block publishers.
const CHANNEL_CAPACITY: usize = 256;

struct StoredSnapshot {
    job: Job,
    expires_at: Instant,
}

/// In-process job store. Snapshots expire lazily on read; channels live
/// for the process lifetime.
pub struct InMemoryStore {
    jobs: RwLock<HashMap<Uuid, StoredSnapshot>>,
    channels: RwLock<HashMap<Uuid, broadcast::Sender<JobEvent>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Drop expired snapshots and channels with no remaining subscribers.
    /// Returns the number of snapshots removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, stored| stored.expires_at > now);
        let removed = before - jobs.len();

        let mut channels = self.channels.write().await;
        channels.retain(|job_id, tx| tx.receiver_count() > 0 || jobs.contains_key(job_id));

        if removed > 0 {
            debug!(count = removed, "Purged expired job snapshots");
        }
        removed
    }

    /// Number of live subscribers on a job's channel.
    pub async fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.channels
            .read()
            .await
            .get(&job_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
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

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(
            job.job_id,
            StoredSnapshot {
                job: job.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(&job_id)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.job.clone()))
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

/// Spawn a background task that periodically purges expired snapshots.
pub fn spawn_purge_task(
    store: std::sync::Arc<InMemoryStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            store.purge_expired().await;
        }
    })
}
