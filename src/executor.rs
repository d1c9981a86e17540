//! Workflow executor — spawns generation workflows as cancellable
//! background tasks and contains their failures at job granularity.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, WorkflowError};
use crate::job::manager::JobManager;
use crate::job::model::{JobFailure, JobMode, JobStatus};
use crate::workflow::{JobProgressObserver, Workflow, WorkflowContext};

/// Fire-and-forget workflow execution with an active-job registry for
/// later cancellation.
pub struct WorkflowExecutor {
    manager: Arc<JobManager>,
    workflow: Arc<dyn Workflow>,
    active: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
}

impl WorkflowExecutor {
    pub fn new(manager: Arc<JobManager>, workflow: Arc<dyn Workflow>) -> Self {
        Self {
            manager,
            workflow,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a reactive (user-query-driven) workflow in the background.
    /// Returns as soon as the task is registered.
    pub async fn execute_reactive(
        &self,
        job_id: Uuid,
        user_id: impl Into<String>,
        query: Option<String>,
        constraints: Option<Value>,
    ) {
        let ctx = WorkflowContext {
            session_id: job_id,
            user_id: user_id.into(),
            query,
            constraints,
            mode: JobMode::Reactive,
        };
        self.spawn(job_id, ctx).await;
    }

    /// Start a proactive (system-initiated) workflow in the background.
    pub async fn execute_proactive(
        &self,
        job_id: Uuid,
        user_id: impl Into<String>,
        constraints: Option<Value>,
    ) {
        let ctx = WorkflowContext {
            session_id: job_id,
            user_id: user_id.into(),
            query: None,
            constraints,
            mode: JobMode::Proactive,
        };
        self.spawn(job_id, ctx).await;
    }

    async fn spawn(&self, job_id: Uuid, ctx: WorkflowContext) {
        let manager = self.manager.clone();
        let workflow = self.workflow.clone();
        let active = self.active.clone();

        let handle = tokio::spawn(async move {
            run_job(manager, workflow, job_id, ctx).await;
            // Cleanup runs on every completion path; an aborted task is
            // removed by cancel() instead.
            active.write().await.remove(&job_id);
        });

        self.active.write().await.insert(job_id, handle);
        info!(job_id = %job_id, "Workflow spawned");
    }

    /// Request cancellation of a running job and mark it `Cancelled`.
    ///
    /// Cancellation is cooperative at the task level: a provider call in
    /// flight is not forcibly interrupted, but the task is aborted at its
    /// next suspension point.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), Error> {
        if let Some(handle) = self.active.write().await.remove(&job_id) {
            if !handle.is_finished() {
                handle.abort();
            }
            info!(job_id = %job_id, "Workflow cancelled");
        }
        self.manager
            .update_job_status(job_id, JobStatus::Cancelled, None)
            .await?;
        Ok(())
    }

    /// Check if a job's workflow is still registered as active.
    pub async fn is_active(&self, job_id: Uuid) -> bool {
        self.active.read().await.contains_key(&job_id)
    }

    /// IDs of all jobs with an active workflow.
    pub async fn active_jobs(&self) -> Vec<Uuid> {
        self.active.read().await.keys().copied().collect()
    }
}

/// One job's full background run: mark planning, run the workflow with a
/// progress observer, and reduce the outcome to a terminal job state.
/// Nothing escapes to the scheduler.
async fn run_job(
    manager: Arc<JobManager>,
    workflow: Arc<dyn Workflow>,
    job_id: Uuid,
    ctx: WorkflowContext,
) {
    if let Err(e) = manager
        .update_job_status(job_id, JobStatus::Planning, None)
        .await
    {
        warn!(job_id = %job_id, error = %e, "Could not mark job planning");
        return;
    }

    let observer = Arc::new(JobProgressObserver::new(manager.clone(), job_id));
    match workflow.run(ctx, observer).await {
        Ok(result) => {
            if let Err(e) = manager.set_final_result(job_id, result).await {
                warn!(job_id = %job_id, error = %e, "Could not record final result");
            }
        }
        Err(WorkflowError::Cancelled) => {
            // Status is set by cancel(); a cancelled run is not a failure.
            debug!(job_id = %job_id, "Workflow run cancelled");
        }
        Err(WorkflowError::Execution { kind, message }) => {
            warn!(job_id = %job_id, kind = %kind, "Workflow failed");
            let failure = JobFailure::new(kind, message);
            if let Err(e) = manager
                .update_job_status(job_id, JobStatus::Failed, Some(failure))
                .await
            {
                warn!(job_id = %job_id, error = %e, "Could not mark job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::{JobMode, TaskInfo, TaskStatus};
    use crate::store::{InMemoryStore, JobStore};
    use crate::workflow::WorkflowObserver;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Scripted workflow: two stages, one task, one partial output.
    struct ScriptedWorkflow;

    #[async_trait]
    impl Workflow for ScriptedWorkflow {
        async fn run(
            &self,
            ctx: WorkflowContext,
            observer: Arc<dyn WorkflowObserver>,
        ) -> Result<Value, WorkflowError> {
            observer.on_stage("research").await;
            observer
                .on_task(TaskInfo {
                    task_id: "t1".into(),
                    agent: "researcher".into(),
                    task_name: "gather".into(),
                    status: TaskStatus::Completed,
                    output: Some(serde_json::json!({"sources": 2})),
                    confidence_score: Some(0.9),
                })
                .await;
            observer
                .on_output("summary", serde_json::json!("partial"))
                .await;
            observer.on_stage("synthesis").await;
            Ok(serde_json::json!({"answer": ctx.query}))
        }
    }

    struct FailingWorkflow;

    #[async_trait]
    impl Workflow for FailingWorkflow {
        async fn run(
            &self,
            _ctx: WorkflowContext,
            _observer: Arc<dyn WorkflowObserver>,
        ) -> Result<Value, WorkflowError> {
            Err(WorkflowError::execution("ProviderError", "upstream 503"))
        }
    }

    /// Blocks until cancelled (or released externally).
    struct HangingWorkflow {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Workflow for HangingWorkflow {
        async fn run(
            &self,
            _ctx: WorkflowContext,
            _observer: Arc<dyn WorkflowObserver>,
        ) -> Result<Value, WorkflowError> {
            self.started.notify_one();
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }

    async fn setup(workflow: Arc<dyn Workflow>) -> (Arc<JobManager>, WorkflowExecutor) {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryStore::new());
        let manager = Arc::new(JobManager::new(store, Duration::from_secs(60)));
        let executor = WorkflowExecutor::new(manager.clone(), workflow);
        (manager, executor)
    }

    async fn wait_for_terminal(manager: &JobManager, job_id: Uuid) -> JobStatus {
        for _ in 0..100 {
            let job = manager.get_job(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn successful_run_completes_job_with_progress() {
        let (manager, executor) = setup(Arc::new(ScriptedWorkflow)).await;
        let job = manager
            .create_job("u1", JobMode::Reactive, Some("what changed?".into()), None)
            .await
            .unwrap();
        let id = job.job_id;

        executor
            .execute_reactive(id, "u1", Some("what changed?".into()), None)
            .await;

        assert_eq!(wait_for_terminal(&manager, id).await, JobStatus::Completed);

        let done = manager.get_job(id).await.unwrap();
        assert_eq!(
            done.final_result,
            Some(serde_json::json!({"answer": "what changed?"}))
        );
        assert_eq!(done.tasks.len(), 1);
        assert_eq!(done.partial_outputs["summary"], serde_json::json!("partial"));
        assert_eq!(done.current_state.as_deref(), Some("synthesis"));

        // Cleanup removed the job from the registry.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!executor.is_active(id).await);
    }

    #[tokio::test]
    async fn failed_run_marks_job_failed_with_payload() {
        let (manager, executor) = setup(Arc::new(FailingWorkflow)).await;
        let job = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        executor.execute_reactive(id, "u1", None, None).await;

        assert_eq!(wait_for_terminal(&manager, id).await, JobStatus::Failed);

        let failed = manager.get_job(id).await.unwrap();
        let error = failed.error.unwrap();
        assert_eq!(error.kind, "ProviderError");
        assert_eq!(error.message, "upstream 503");
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_marks_cancelled_and_clears_registry() {
        let started = Arc::new(Notify::new());
        let (manager, executor) = setup(Arc::new(HangingWorkflow {
            started: started.clone(),
        }))
        .await;
        let job = manager
            .create_job("u1", JobMode::Proactive, None, None)
            .await
            .unwrap();
        let id = job.job_id;

        executor.execute_proactive(id, "u1", None).await;
        started.notified().await;
        assert!(executor.is_active(id).await);

        executor.cancel(id).await.unwrap();

        let cancelled = manager.get_job(id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(!executor.is_active(id).await);
        assert!(executor.active_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn workflow_failure_does_not_affect_other_jobs() {
        let (manager, executor) = setup(Arc::new(FailingWorkflow)).await;
        let a = manager
            .create_job("u1", JobMode::Reactive, None, None)
            .await
            .unwrap();
        let b = manager
            .create_job("u2", JobMode::Reactive, None, None)
            .await
            .unwrap();

        executor.execute_reactive(a.job_id, "u1", None, None).await;
        wait_for_terminal(&manager, a.job_id).await;

        // The other job is untouched.
        let other = manager.get_job(b.job_id).await.unwrap();
        assert_eq!(other.status, JobStatus::Started);
    }
}
