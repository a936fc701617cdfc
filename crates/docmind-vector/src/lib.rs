//! DocuMind Vector - Embeddings and similarity search
//!
//! Provides the embedding backends and the in-memory index that maps
//! chunks to their embeddings for nearest-neighbor search.

use async_trait::async_trait;
use docmind_core::{Chunk, Result};

pub mod embedding;
pub mod memory;

pub use embedding::{create_embedding_provider, http_client, OllamaEmbedding, OpenAiEmbedding};
pub use memory::InMemoryVectorIndex;

/// Default number of chunks returned by a search
pub const DEFAULT_TOP_K: usize = 4;

/// A chunk together with its similarity to a query (higher is closer)
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Trait for vector index operations
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and insert chunks, returning how many were added
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Find the `k` chunks nearest to the query text, nearest first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;

    /// Number of indexed chunks
    async fn len(&self) -> usize;

    /// Whether the index holds no chunks
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
