//! In-memory vector index.
//!
//! Entries live in a `Vec` behind a `tokio::sync::RwLock`, so insertion
//! order doubles as the tie-breaker for equally similar chunks. Nothing is
//! persisted; the index lives as long as its owner.

use std::sync::Arc;

use async_trait::async_trait;
use docmind_core::{Chunk, DistanceMetric, DocmindError, EmbeddingProvider, Result};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{ScoredChunk, VectorIndex};

#[derive(Debug, Default)]
struct IndexState {
    /// Fixed by the first insertion
    dimension: Option<usize>,
    entries: Vec<(Chunk, Vec<f32>)>,
}

/// Append-only index of chunks and their embeddings
pub struct InMemoryVectorIndex {
    provider: Arc<dyn EmbeddingProvider>,
    metric: DistanceMetric,
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create an empty index using cosine similarity
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_metric(provider, DistanceMetric::Cosine)
    }

    /// Create an empty index with the given metric
    pub fn with_metric(provider: Arc<dyn EmbeddingProvider>, metric: DistanceMetric) -> Self {
        Self {
            provider,
            metric,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Embedding dimension, once something has been indexed
    pub async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    /// Like [`VectorIndex::search`] but keeps the similarity scores
    pub async fn search_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.state.read().await.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query).await?;

        let state = self.state.read().await;
        if let Some(dimension) = state.dimension {
            check_dimension(dimension, &query_vector)?;
        }

        let mut scored: Vec<ScoredChunk> = state
            .entries
            .iter()
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: similarity(self.metric, &query_vector, vector),
            })
            .collect();
        drop(state);

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(
            provider = self.provider.name(),
            results = scored.len(),
            "vector search completed"
        );
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // Embed before locking so searches are not blocked on the provider
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.provider.embed_batch(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(DocmindError::ProviderError(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut state = self.state.write().await;
        let dimension = match state.dimension {
            Some(dimension) => dimension,
            None => vectors[0].len(),
        };
        for vector in &vectors {
            check_dimension(dimension, vector)?;
        }

        state.dimension = Some(dimension);
        let added = chunks.len();
        state.entries.extend(chunks.into_iter().zip(vectors));

        info!(
            provider = self.provider.name(),
            added,
            total = state.entries.len(),
            dimension,
            "chunks indexed"
        );
        Ok(added)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .search_scored(query, k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

/// Reject vectors of the wrong length or with NaN/infinite components
fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.is_empty() || vector.len() != expected {
        return Err(DocmindError::ProviderError(format!(
            "Embedding dimension mismatch: expected {expected}, got {}",
            vector.len()
        )));
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(DocmindError::ProviderError(format!(
            "Embedding has a non-finite component at {pos}"
        )));
    }
    Ok(())
}

/// Similarity where larger means closer
fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Euclidean => -euclidean_distance(a, b),
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
