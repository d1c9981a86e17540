//! Workflow seam — the opaque generation workflow and its observer.
//!
//! The workflow is a black box to the orchestrator. Progress surfaces
//! through an explicit observer interface handed in at invocation time:
//! the workflow calls the hooks at its own extension points, and the
//! executor wires them to job-manager mutations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::job::manager::JobManager;
use crate::job::model::{JobMode, TaskInfo};

/// Input handed to the generation workflow.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// The job ID, doubling as the session ID for the workflow run.
    pub session_id: Uuid,
    pub user_id: String,
    pub query: Option<String>,
    pub constraints: Option<Value>,
    pub mode: JobMode,
}

/// Progress hooks invoked by the workflow at its extension points.
#[async_trait]
pub trait WorkflowObserver: Send + Sync {
    /// A new internal stage became active (advisory label).
    async fn on_stage(&self, label: &str);

    /// An agent task started or finished; carries the task's own status.
    async fn on_task(&self, task: TaskInfo);

    /// An incremental output became available.
    async fn on_output(&self, key: &str, value: Value);
}

/// The opaque multi-step generation workflow.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Run to completion, reporting progress through the observer.
    /// Returns the final result value.
    async fn run(
        &self,
        ctx: WorkflowContext,
        observer: Arc<dyn WorkflowObserver>,
    ) -> Result<Value, WorkflowError>;
}

/// Observer that forwards workflow progress into job-manager mutations.
///
/// Persistence failures are logged and swallowed: a progress update that
/// fails to persist must not take the workflow down with it.
pub struct JobProgressObserver {
    manager: Arc<JobManager>,
    job_id: Uuid,
}

impl JobProgressObserver {
    pub fn new(manager: Arc<JobManager>, job_id: Uuid) -> Self {
        Self { manager, job_id }
    }
}

#[async_trait]
impl WorkflowObserver for JobProgressObserver {
    async fn on_stage(&self, label: &str) {
        if let Err(e) = self.manager.update_workflow_state(self.job_id, label).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to persist workflow state");
        }
    }

    async fn on_task(&self, task: TaskInfo) {
        if let Err(e) = self.manager.add_task_result(self.job_id, task).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to persist task result");
        }
    }

    async fn on_output(&self, key: &str, value: Value) {
        if let Err(e) = self
            .manager
            .update_partial_output(self.job_id, key, value)
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "Failed to persist partial output");
        }
    }
}
