//! `JobStore` trait — expiring snapshot storage plus per-job pub/sub.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::events::JobEvent;
use crate::job::model::Job;

/// Backend-agnostic job persistence and event fan-out.
///
/// Snapshots are stored whole with a time-to-live; expired snapshots are
/// treated as absent. Published events are NOT persisted — a subscriber
/// that connects between two events misses the first one, which is why
/// the event stream always replays the current snapshot on connect.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store (or overwrite) a job snapshot with the given TTL.
    async fn put(&self, job: &Job, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch a job snapshot. Expired snapshots read as `None`.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Publish an event on the job's channel. A publish with no
    /// subscribers is not an error.
    async fn publish(&self, job_id: Uuid, event: &JobEvent) -> Result<(), StoreError>;

    /// Subscribe to the job's channel. Events published before the call
    /// are not delivered.
    async fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent>;
}
