use std::sync::Arc;
use std::time::Duration;

use agentflow::admission::AdmissionController;
use agentflow::config::{OrchestratorConfig, StoreBackend};
use agentflow::error::WorkflowError;
use agentflow::executor::WorkflowExecutor;
use agentflow::job::manager::JobManager;
use agentflow::job::model::{JobMode, TaskInfo, TaskStatus};
use agentflow::store::{InMemoryStore, JobStore, LibSqlStore, spawn_purge_task};
use agentflow::stream::EventStream;
use agentflow::workflow::{Workflow, WorkflowContext, WorkflowObserver};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

/// Stand-in workflow for the demo: two stages, one task, one partial
/// output, then a final report.
struct DemoWorkflow;

#[async_trait]
impl Workflow for DemoWorkflow {
    async fn run(
        &self,
        ctx: WorkflowContext,
        observer: Arc<dyn WorkflowObserver>,
    ) -> Result<Value, WorkflowError> {
        observer.on_stage("research").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        observer
            .on_task(TaskInfo {
                task_id: "research-1".to_string(),
                agent: "researcher".to_string(),
                task_name: "gather sources".to_string(),
                status: TaskStatus::Completed,
                output: Some(json!({"sources": 3})),
                confidence_score: Some(0.92),
            })
            .await;
        observer.on_output("outline", json!(["intro", "findings"])).await;

        observer.on_stage("synthesis").await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        Ok(json!({
            "query": ctx.query,
            "report": "demo report body",
        }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OrchestratorConfig::from_env();
    config.validate()?;
    eprintln!("agentflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Max concurrent jobs: {}", config.max_concurrent_jobs);
    eprintln!("   Requests per minute: {}", config.requests_per_minute);

    let store: Arc<dyn JobStore> = match &config.store {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            spawn_purge_task(store.clone(), Duration::from_secs(60));
            store
        }
        StoreBackend::LibSql { path } => Arc::new(LibSqlStore::new_local(path).await?),
    };

    let manager = Arc::new(JobManager::new(store.clone(), config.job_ttl));
    let admission = AdmissionController::new(config.max_concurrent_jobs, config.requests_per_minute);
    let executor = WorkflowExecutor::new(manager.clone(), Arc::new(DemoWorkflow));
    let streams = EventStream::new(store);

    // Admit, create, and launch one demo job.
    let _permit = admission.acquire().await;
    let job = manager
        .create_job(
            "demo-user",
            JobMode::Reactive,
            Some("what changed this week?".to_string()),
            None,
        )
        .await?;
    executor
        .execute_reactive(
            job.job_id,
            "demo-user",
            Some("what changed this week?".to_string()),
            None,
        )
        .await;

    // Follow the job's event stream to completion, one JSON line per event.
    let mut stream = streams.stream(job.job_id).await?;
    while let Some(event) = stream.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    let done = manager.get_job(job.job_id).await?;
    eprintln!("Job {} finished as {}", done.job_id, done.status);
    Ok(())
}
