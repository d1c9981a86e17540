//! Progress-stream event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::job::model::{Job, TaskInfo};

/// Type of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    StateChange,
    TaskStart,
    TaskComplete,
    AgentOutput,
    Complete,
    Error,
}

/// An event published on a job's channel and fanned out to stream
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub event_type: JobEventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Build an event stamped with the current time.
    pub fn new(event_type: JobEventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }

    /// A state-change event reflecting the job's current snapshot. Also
    /// used as the replay event a new subscriber receives on connect.
    pub fn state_change(job: &Job) -> Self {
        Self::new(
            JobEventType::StateChange,
            json!({
                "job_id": job.job_id,
                "status": job.status,
                "current_state": job.current_state,
                "awaiting_approval": job.awaiting_approval,
            }),
        )
    }

    /// A task event; start or complete depending on the task's own status.
    pub fn task(job_id: uuid::Uuid, task: &TaskInfo) -> Self {
        let event_type = if task.status.is_finished() {
            JobEventType::TaskComplete
        } else {
            JobEventType::TaskStart
        };
        Self::new(
            event_type,
            json!({
                "job_id": job_id,
                "task": task,
            }),
        )
    }

    /// An incremental agent output event.
    pub fn agent_output(job_id: uuid::Uuid, key: &str, value: &Value) -> Self {
        Self::new(
            JobEventType::AgentOutput,
            json!({
                "job_id": job_id,
                "key": key,
                "value": value,
            }),
        )
    }

    /// The completion event carrying the final result.
    pub fn complete(job: &Job) -> Self {
        Self::new(
            JobEventType::Complete,
            json!({
                "job_id": job.job_id,
                "final_result": job.final_result,
            }),
        )
    }

    /// The terminal error event.
    pub fn error(job: &Job) -> Self {
        Self::new(
            JobEventType::Error,
            json!({
                "job_id": job.job_id,
                "error": job.error,
            }),
        )
    }

    /// True if a subscriber should close its stream after this event:
    /// a `complete` or `error` event, or a state change into `Cancelled`
    /// (cancellation has no dedicated event type). State changes into
    /// `Completed` or `Failed` do NOT end the stream; the dedicated
    /// terminal event published right after them does.
    pub fn ends_stream(&self) -> bool {
        match self.event_type {
            JobEventType::Complete | JobEventType::Error => true,
            JobEventType::StateChange => self
                .data
                .get("status")
                .and_then(|s| {
                    serde_json::from_value::<crate::job::model::JobStatus>(s.clone()).ok()
                })
                .is_some_and(|s| s == crate::job::model::JobStatus::Cancelled),
            _ => false,
        }
    }
}
