//! Per-job event stream — snapshot replay plus live event forwarding.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, JobError};
use crate::job::events::JobEvent;
use crate::job::model::{Job, JobStatus};
use crate::store::JobStore;

/// Buffer between the forwarding task and the consumer.
const STREAM_BUFFER: usize = 64;

/// Builds per-job subscriber streams on top of the store's pub/sub.
pub struct EventStream {
    store: Arc<dyn JobStore>,
}

impl EventStream {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Open an event stream for a job.
    ///
    /// The first yielded event is always a synthetic state-change replay
    /// of the current snapshot; live events follow until a terminal event
    /// arrives, after which the stream ends. Dropping the stream tears
    /// down the subscription.
    pub async fn stream(&self, job_id: Uuid) -> Result<ReceiverStream<JobEvent>, Error> {
        // Subscribe before reading the snapshot so no event published
        // between the two is lost.
        let mut sub = self.store.subscribe(job_id).await;
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            if tx.send(JobEvent::state_change(&job)).await.is_err() {
                return;
            }

            // Already-terminal jobs get their terminal event synthesized;
            // nothing more will be published on the channel.
            if job.status.is_terminal() {
                if let Some(event) = terminal_event(&job) {
                    let _ = tx.send(event).await;
                }
                return;
            }

            // Watch for consumer disconnect alongside the subscription, so
            // a dropped stream tears the task down even while the job is
            // quiet.
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!(job_id = %job_id, "Stream consumer dropped");
                        break;
                    }
                    received = sub.recv() => match received {
                        Ok(event) => {
                            let ends = event.ends_stream();
                            if tx.send(event).await.is_err() {
                                break;
                            }
                            if ends {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(job_id = %job_id, skipped, "Stream lagged, events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// The terminal event matching a finished snapshot. Cancelled jobs carry
/// no dedicated event type; the state-change replay already covers them.
fn terminal_event(job: &Job) -> Option<JobEvent> {
    match job.status {
        JobStatus::Completed => Some(JobEvent::complete(job)),
        JobStatus::Failed => Some(JobEvent::error(job)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::events::JobEventType;
    use crate::job::manager::JobManager;
    use crate::job::model::JobMode;
    use crate::store::InMemoryStore;
    use futures::StreamExt;
    use std::time::Duration;

    fn setup() -> (Arc<JobManager>, EventStream) {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryStore::new());
        let manager = Arc::new(JobManager::new(store.clone(), Duration::from_secs(60)));
        (manager, EventStream::new(store))
    }

    #[tokio::test]
    async fn replay_comes_first_then_terminal_event_ends_stream() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        let stream = streams.stream(id).await.unwrap();

        manager
            .update_job_status(id, JobStatus::Planning, None)
            .await
            .unwrap();
        manager
            .update_job_status(id, JobStatus::Executing, None)
            .await
            .unwrap();
        manager
            .set_final_result(id, serde_json::json!({"report": "done"}))
            .await
            .unwrap();

        let events: Vec<JobEvent> = stream.collect().await;
        assert_eq!(events.first().unwrap().event_type, JobEventType::StateChange);
        assert_eq!(events.last().unwrap().event_type, JobEventType::Complete);

        // Exactly one terminal event.
        let terminal = events.iter().filter(|e| e.ends_stream()).count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn already_completed_job_yields_replay_and_complete() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;
        manager
            .update_job_status(id, JobStatus::Planning, None)
            .await
            .unwrap();
        manager
            .update_job_status(id, JobStatus::Executing, None)
            .await
            .unwrap();
        manager
            .set_final_result(id, serde_json::json!(42))
            .await
            .unwrap();

        let events: Vec<JobEvent> = streams.stream(id).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, JobEventType::StateChange);
        assert_eq!(events[1].event_type, JobEventType::Complete);
    }

    #[tokio::test]
    async fn already_failed_job_yields_error_event() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;
        manager
            .update_job_status(
                id,
                JobStatus::Failed,
                Some(crate::job::model::JobFailure::new("Boom", "it broke")),
            )
            .await
            .unwrap();

        let events: Vec<JobEvent> = streams.stream(id).await.unwrap().collect().await;
        assert_eq!(events.last().unwrap().event_type, JobEventType::Error);
    }

    #[tokio::test]
    async fn live_failure_yields_error_event_last() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        let stream = streams.stream(id).await.unwrap();
        manager
            .update_job_status(
                id,
                JobStatus::Failed,
                Some(crate::job::model::JobFailure::new("Boom", "it broke")),
            )
            .await
            .unwrap();

        // Replay, the failed state change, then the error event.
        let events: Vec<JobEvent> = stream.collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, JobEventType::StateChange);
        assert_eq!(events[1].event_type, JobEventType::StateChange);
        assert_eq!(events.last().unwrap().event_type, JobEventType::Error);
    }

    #[tokio::test]
    async fn live_completion_via_status_update_yields_complete_event() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        let stream = streams.stream(id).await.unwrap();
        manager
            .update_job_status(id, JobStatus::Planning, None)
            .await
            .unwrap();
        manager
            .update_job_status(id, JobStatus::Executing, None)
            .await
            .unwrap();
        manager
            .update_job_status(id, JobStatus::Completed, None)
            .await
            .unwrap();

        let events: Vec<JobEvent> = stream.collect().await;
        assert_eq!(events.last().unwrap().event_type, JobEventType::Complete);
    }

    #[tokio::test]
    async fn cancelled_job_ends_stream_without_error_event() {
        let (manager, streams) = setup();
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        let stream = streams.stream(id).await.unwrap();
        manager
            .update_job_status(id, JobStatus::Cancelled, None)
            .await
            .unwrap();

        let events: Vec<JobEvent> = stream.collect().await;
        // Replay, then the terminal state change. No error event.
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == JobEventType::StateChange));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (_, streams) = setup();
        let err = streams.stream(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Job(JobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn dropping_stream_tears_down_subscription() {
        let store = Arc::new(InMemoryStore::new());
        let manager = JobManager::new(store.clone(), Duration::from_secs(60));
        let streams = EventStream::new(store.clone());
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        let stream = streams.stream(id).await.unwrap();
        assert_eq!(store.subscriber_count(id).await, 1);

        // The forwarder must notice the drop without another publish.
        drop(stream);
        for _ in 0..100 {
            if store.subscriber_count(id).await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.subscriber_count(id).await, 0);

        // Publishing after the consumer is gone must not error.
        manager
            .update_workflow_state(id, "planning")
            .await
            .unwrap();
    }
}
