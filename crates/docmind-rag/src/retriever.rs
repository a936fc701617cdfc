//! Query-to-chunks retrieval
//!
//! The retriever is the seam between the pipeline and the index: ranking
//! strategy can change here without touching the index implementation.

use std::sync::Arc;

use async_trait::async_trait;
use docmind_core::{Chunk, Result};
use docmind_vector::{VectorIndex, DEFAULT_TOP_K};

/// Turns a free-text query into a ranked set of chunks
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks, surfacing backend failures
    async fn try_retrieve(&self, query: &str) -> Result<Vec<Chunk>>;

    /// Retrieve chunks; failures are logged and collapse to no results
    async fn retrieve(&self, query: &str) -> Vec<Chunk> {
        match self.try_retrieve(query).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(error = %e, "retrieval failed");
                Vec::new()
            }
        }
    }
}

/// Retriever backed directly by a vector index
pub struct VectorRetriever {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl VectorRetriever {
    /// Create a retriever returning the default number of chunks
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set how many chunks to return
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn try_retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let chunks = self.index.search(query, self.top_k).await?;
        tracing::debug!(results = chunks.len(), top_k = self.top_k, "retrieved chunks");
        Ok(chunks)
    }
}
