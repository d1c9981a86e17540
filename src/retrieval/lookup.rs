//! Semantic retrieval — lazily provisioned vector lookup with LRU-cached
//! embedding and search results.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::retrieval::cache::LruCache;
use crate::retrieval::provider::{EmbeddingProvider, SearchHit, VectorIndex, VectorPoint};

/// Vector-index client that provisions its collection once, on first use.
pub struct VectorLookupClient {
    index: Arc<dyn VectorIndex>,
    collection: String,
    dim: usize,
    ready: OnceCell<()>,
}

impl VectorLookupClient {
    pub fn new(index: Arc<dyn VectorIndex>, collection: impl Into<String>, dim: usize) -> Self {
        Self {
            index,
            collection: collection.into(),
            dim,
            ready: OnceCell::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection on first call; later calls are no-ops.
    /// Concurrent callers coalesce onto one in-flight creation.
    async fn ensure_ready(&self) -> Result<(), ProviderError> {
        self.ready
            .get_or_try_init(|| async {
                info!(collection = %self.collection, dim = self.dim, "Provisioning collection");
                self.index.ensure_collection(&self.collection, self.dim).await
            })
            .await?;
        Ok(())
    }

    pub async fn insert(&self, points: Vec<VectorPoint>) -> Result<(), ProviderError> {
        self.ensure_ready().await?;
        self.index.insert(&self.collection, points).await
    }

    pub async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        self.ensure_ready().await?;
        self.index.search(&self.collection, vector, top_k, filter).await
    }
}

/// Embedding plus vector search behind two independent LRU caches.
///
/// Cache keys are content hashes, so identical inputs hit regardless of
/// who issues them. Provider errors are never cached; the next call
/// retries the provider.
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    client: Arc<VectorLookupClient>,
    embed_cache: LruCache<String, Vec<f32>>,
    search_cache: LruCache<String, Vec<SearchHit>>,
}

impl SemanticRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        client: Arc<VectorLookupClient>,
        embed_cache_size: usize,
        search_cache_size: usize,
    ) -> Self {
        Self {
            embedder,
            client,
            embed_cache: LruCache::new(embed_cache_size),
            search_cache: LruCache::new(search_cache_size),
        }
    }

    /// Embed `text`, serving repeats from the cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let key = hash_key(&[text]);
        if let Some(vector) = self.embed_cache.get(&key) {
            debug!("Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.embedder.embed(text).await?;
        self.embed_cache.insert(key, vector.clone());
        Ok(vector)
    }

    /// Search for `query`, embedding it first if needed. The search cache
    /// is keyed on the full request (query, top_k, filter), so the same
    /// query with a different filter is a distinct entry.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let filter_repr = filter
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default();
        let key = hash_key(&[query, &top_k.to_string(), &filter_repr]);

        if let Some(hits) = self.search_cache.get(&key) {
            debug!("Search cache hit");
            return Ok(hits);
        }

        let vector = self.embed(query).await?;
        let hits = self.client.search(&vector, top_k, filter).await?;
        self.search_cache.insert(key, hits.clone());
        Ok(hits)
    }

    pub async fn insert(&self, points: Vec<VectorPoint>) -> Result<(), ProviderError> {
        self.client.insert(points).await
    }
}

/// Stable cache key: SHA-256 over the parts joined with a separator that
/// cannot appear ambiguously.
fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
