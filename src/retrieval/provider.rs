//! Provider seams for embedding and vector-index backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// One vector with its payload, ready for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One similarity-search match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// A vector database holding named collections of points.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist. Must be idempotent.
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<(), ProviderError>;

    async fn insert(&self, collection: &str, points: Vec<VectorPoint>)
        -> Result<(), ProviderError>;

    /// Nearest-neighbor search, optionally narrowed by a payload filter.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, ProviderError>;
}
