//! Job manager — the state-machine authority.
//!
//! Every mutation is a full read-modify-write of the job snapshot: load,
//! mutate, persist, then publish a change event on the job's channel.
//! Concurrent mutators of the same job race last-writer-wins; per-job
//! ordering of persist and publish is best effort.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, JobError};
use crate::job::events::JobEvent;
use crate::job::model::{Job, JobFailure, JobMode, JobStatus, TaskInfo};
use crate::store::JobStore;

/// Creates jobs and applies all lifecycle mutations.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    ttl: Duration,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The backing store, shared with the event stream.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create a new job in `Started` status, persist it, and publish the
    /// first state-change event.
    pub async fn create_job(
        &self,
        user_id: impl Into<String>,
        mode: JobMode,
        query: Option<String>,
        constraints: Option<Value>,
    ) -> Result<Job, Error> {
        let job = Job::new(user_id, mode, query, constraints);
        self.store.put(&job, self.ttl).await?;
        self.store
            .publish(job.job_id, &JobEvent::state_change(&job))
            .await?;

        info!(job_id = %job.job_id, user_id = %job.user_id, ?mode, "Job created");
        Ok(job)
    }

    /// Fetch a job snapshot.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, Error> {
        self.load(job_id).await
    }

    /// Transition a job to a new status, validating against the state
    /// graph. A terminal target records the optional error payload.
    pub async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<JobFailure>,
    ) -> Result<Job, Error> {
        let mut job = self.load(job_id).await?;
        job.transition_to(status)?;
        if status == JobStatus::Failed
            && let Some(failure) = error
        {
            job.error = Some(failure);
        }
        self.store.put(&job, self.ttl).await?;

        self.store
            .publish(job_id, &JobEvent::state_change(&job))
            .await?;
        // Completed and Failed carry a dedicated terminal event; streams
        // close on that event, not on the state change.
        match status {
            JobStatus::Failed => self.store.publish(job_id, &JobEvent::error(&job)).await?,
            JobStatus::Completed => self.store.publish(job_id, &JobEvent::complete(&job)).await?,
            _ => {}
        }

        info!(job_id = %job_id, status = %status, "Job status updated");
        Ok(job)
    }

    /// Set the advisory workflow-stage label. Purely informational.
    pub async fn update_workflow_state(
        &self,
        job_id: Uuid,
        label: impl Into<String>,
    ) -> Result<(), Error> {
        let mut job = self.load_active(job_id).await?;
        job.current_state = Some(label.into());
        job.touch();
        self.store.put(&job, self.ttl).await?;
        self.store
            .publish(job_id, &JobEvent::state_change(&job))
            .await?;

        debug!(job_id = %job_id, state = ?job.current_state, "Workflow state updated");
        Ok(())
    }

    /// Upsert a task result. Publishes a task-start or task-complete
    /// event depending on the task's own status.
    pub async fn add_task_result(&self, job_id: Uuid, task: TaskInfo) -> Result<(), Error> {
        let mut job = self.load_active(job_id).await?;
        let event = JobEvent::task(job_id, &task);
        job.upsert_task(task);
        self.store.put(&job, self.ttl).await?;
        self.store.publish(job_id, &event).await?;
        Ok(())
    }

    /// Merge a key/value pair into the job's partial outputs.
    pub async fn update_partial_output(
        &self,
        job_id: Uuid,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), Error> {
        let key = key.into();
        let mut job = self.load_active(job_id).await?;
        let event = JobEvent::agent_output(job_id, &key, &value);
        job.merge_partial_output(key, value);
        self.store.put(&job, self.ttl).await?;
        self.store.publish(job_id, &event).await?;
        Ok(())
    }

    /// Record the final result, forcing the job to `Completed`.
    pub async fn set_final_result(&self, job_id: Uuid, result: Value) -> Result<Job, Error> {
        let mut job = self.load_active(job_id).await?;
        job.final_result = Some(result);
        job.status = JobStatus::Completed;
        job.awaiting_approval = false;
        job.touch();
        job.completed_at = Some(job.updated_at);
        self.store.put(&job, self.ttl).await?;
        self.store.publish(job_id, &JobEvent::complete(&job)).await?;

        info!(job_id = %job_id, "Job completed");
        Ok(job)
    }

    /// Gate the job on human approval.
    pub async fn request_approval(&self, job_id: Uuid, data: Value) -> Result<(), Error> {
        let mut job = self.load(job_id).await?;
        job.transition_to(JobStatus::WaitingApproval)?;
        job.awaiting_approval = true;
        job.approval_data = Some(data);
        self.store.put(&job, self.ttl).await?;
        self.store
            .publish(job_id, &JobEvent::state_change(&job))
            .await?;

        info!(job_id = %job_id, "Approval requested");
        Ok(())
    }

    /// Release the approval gate, returning the job to `Executing`.
    pub async fn grant_approval(&self, job_id: Uuid) -> Result<(), Error> {
        let mut job = self.load(job_id).await?;
        job.transition_to(JobStatus::Executing)?;
        job.awaiting_approval = false;
        self.store.put(&job, self.ttl).await?;
        self.store
            .publish(job_id, &JobEvent::state_change(&job))
            .await?;

        info!(job_id = %job_id, "Approval granted");
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Job, Error> {
        self.store
            .get(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))
    }

    /// Load a job for mutation, rejecting terminal jobs.
    async fn load_active(&self, job_id: Uuid) -> Result<Job, Error> {
        let job = self.load(job_id).await?;
        if job.status.is_terminal() {
            return Err(Error::Job(JobError::Terminal {
                id: job_id,
                status: job.status,
            }));
        }
        Ok(job)
    }
}
