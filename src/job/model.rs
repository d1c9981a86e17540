//! Job record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum length of a persisted error message. Workflow errors are
/// truncated to this before they land in the job record.
pub const MAX_ERROR_LEN: usize = 500;

/// Execution mode of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Started in response to a user query.
    Reactive,
    /// Started by the system on the user's behalf.
    Proactive,
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job record created, nothing running yet.
    Started,
    /// Workflow is planning its approach.
    Planning,
    /// Workflow is executing.
    Executing,
    /// Blocked on a human approval gate.
    WaitingApproval,
    /// Finished with a final result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    ///
    /// Terminal statuses have no outgoing transitions. Any non-terminal
    /// status may fail or be cancelled.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(target, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, target),
            (Started, Planning)
                | (Planning, Executing)
                | (Executing, WaitingApproval)
                | (WaitingApproval, Executing)
                | (Executing, Completed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::WaitingApproval => "waiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Status of a single task within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// True once the task has finished, in either direction.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single agent task tracked within a job. Upserted by `task_id`,
/// never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Unique within the job.
    pub task_id: String,
    /// Which agent ran the task.
    pub agent: String,
    /// Human-readable task name.
    pub task_name: String,
    /// Task's own status, independent of the job status.
    pub status: TaskStatus,
    /// Task output, if any yet.
    pub output: Option<Value>,
    /// Agent-reported confidence in the output.
    pub confidence_score: Option<f64>,
}

/// Terminal error payload stored on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    pub kind: String,
}

impl JobFailure {
    /// Build a failure payload, truncating the message to [`MAX_ERROR_LEN`].
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let mut message: String = message.into();
        if message.chars().count() > MAX_ERROR_LEN {
            message = message.chars().take(MAX_ERROR_LEN).collect();
        }
        Self {
            message,
            kind: kind.into(),
        }
    }
}

/// One admitted unit of orchestrated work, tracked through the state
/// machine until a terminal outcome. This is the full snapshot persisted
/// to the job store and transmitted to stream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, assigned at creation, immutable.
    pub job_id: Uuid,
    /// Owning user, immutable.
    pub user_id: String,
    /// Execution mode, immutable.
    pub mode: JobMode,
    /// Current status. Mutated only by the job manager.
    pub status: JobStatus,
    /// Advisory label for the active workflow stage. Not used for
    /// control decisions.
    pub current_state: Option<String>,
    /// Original user query, if any.
    pub query: Option<String>,
    /// Caller-supplied constraints, if any.
    pub constraints: Option<Value>,
    /// Agent tasks, keyed by `task_id`.
    pub tasks: Vec<TaskInfo>,
    /// Incrementally accumulated outputs, append/overwrite only.
    pub partial_outputs: serde_json::Map<String, Value>,
    /// Set at most once, on completion.
    pub final_result: Option<Value>,
    /// Set at most once, on failure.
    pub error: Option<JobFailure>,
    /// Human-in-the-loop gate.
    pub awaiting_approval: bool,
    pub approval_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job in `Started` status.
    pub fn new(
        user_id: impl Into<String>,
        mode: JobMode,
        query: Option<String>,
        constraints: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            user_id: user_id.into(),
            mode,
            status: JobStatus::Started,
            current_state: None,
            query,
            constraints,
            tasks: Vec::new(),
            partial_outputs: serde_json::Map::new(),
            final_result: None,
            error: None,
            awaiting_approval: false,
            approval_data: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a validated status transition, updating timestamps.
    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), crate::error::JobError> {
        if !self.status.can_transition_to(target) {
            return Err(crate::error::JobError::InvalidTransition {
                id: self.job_id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.touch();
        if target.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Insert or replace a task by `task_id`.
    pub fn upsert_task(&mut self, task: TaskInfo) {
        match self.tasks.iter_mut().find(|t| t.task_id == task.task_id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
        self.touch();
    }

    /// Merge a key/value pair into the partial outputs.
    pub fn merge_partial_output(&mut self, key: impl Into<String>, value: Value) {
        self.partial_outputs.insert(key.into(), value);
        self.touch();
    }

    /// Bump `updated_at`, keeping timestamps non-decreasing.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
