//! Retrieval layer: embedding/vector-index seams, caching, and the
//! semantic retriever composed from them.

pub mod cache;
pub mod lookup;
pub mod provider;

pub use cache::LruCache;
pub use lookup::{SemanticRetriever, VectorLookupClient};
pub use provider::{EmbeddingProvider, SearchHit, VectorIndex, VectorPoint};
