//! Error types for agentflow.

use uuid::Uuid;

use crate::job::model::JobStatus;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {id} is in terminal state {status} and cannot be mutated")]
    Terminal { id: Uuid, status: JobStatus },
}

/// Persistence-layer errors. Callers treat these as transient
/// infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by the opaque generation workflow. Contained by the
/// executor at job granularity; never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow execution failed ({kind}): {message}")]
    Execution { kind: String, message: String },

    #[error("Workflow was cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Convenience constructor for an execution failure.
    pub fn execution(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Embedding / vector-index provider errors. Never cached — a failed
/// lookup must not poison the cache with a miss entry.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Vector index {op} failed: {reason}")]
    Index { op: String, reason: String },
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
