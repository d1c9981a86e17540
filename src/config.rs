//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Which persistence backend to use for job snapshots.
#[derive(Debug, Clone, Default)]
pub enum StoreBackend {
    /// In-process store; snapshots do not survive a restart. Default for
    /// tests and local development.
    #[default]
    Memory,
    /// libSQL-backed store at the given path; snapshots survive restarts.
    LibSql { path: PathBuf },
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of generation jobs in flight at once.
    pub max_concurrent_jobs: usize,
    /// Admissions allowed per rolling 60-second window.
    pub requests_per_minute: usize,
    /// Time-to-live for persisted job snapshots. Must outlive the longest
    /// expected job.
    pub job_ttl: Duration,
    /// Persistence backend for job snapshots.
    pub store: StoreBackend,
    /// Maximum entries in the embedding cache.
    pub embed_cache_size: usize,
    /// Maximum entries in the query-result cache.
    pub search_cache_size: usize,
    /// Vector-index collection name.
    pub collection: String,
    /// Embedding vector dimension.
    pub embedding_dim: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            requests_per_minute: 30,
            job_ttl: Duration::from_secs(24 * 60 * 60), // 1 day
            store: StoreBackend::Memory,
            embed_cache_size: 512,
            search_cache_size: 256,
            collection: "documents".to_string(),
            embedding_dim: 1536,
        }
    }
}

impl OrchestratorConfig {
    /// Reject configurations that cannot admit any work.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(crate::error::ConfigError::InvalidValue {
                key: "max_concurrent_jobs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.requests_per_minute == 0 {
            return Err(crate::error::ConfigError::InvalidValue {
                key: "requests_per_minute".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Build a config from `AGENTFLOW_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("AGENTFLOW_MAX_CONCURRENT", defaults.max_concurrent_jobs),
            requests_per_minute: env_parse("AGENTFLOW_RPM", defaults.requests_per_minute),
            job_ttl: Duration::from_secs(env_parse(
                "AGENTFLOW_JOB_TTL_SECS",
                defaults.job_ttl.as_secs(),
            )),
            store: match std::env::var("AGENTFLOW_DB_PATH") {
                Ok(path) if !path.is_empty() => StoreBackend::LibSql { path: path.into() },
                _ => StoreBackend::Memory,
            },
            embed_cache_size: env_parse("AGENTFLOW_EMBED_CACHE", defaults.embed_cache_size),
            search_cache_size: env_parse("AGENTFLOW_SEARCH_CACHE", defaults.search_cache_size),
            collection: std::env::var("AGENTFLOW_COLLECTION").unwrap_or(defaults.collection),
            embedding_dim: env_parse("AGENTFLOW_EMBED_DIM", defaults.embedding_dim),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
