//! DocuMind Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout DocuMind:
//! - Document and chunk models
//! - Common error types
//! - Collaborator traits (storage, extraction, embedding, language model)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, DistanceMetric, LlmConfig, LlmProvider, LoggingConfig, RagConfig,
    StorageConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DocuMind operations
#[derive(Error, Debug)]
pub enum DocmindError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DocmindError>;

impl From<ConfigError> for DocmindError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// Start of a page within a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    /// 1-based page number
    pub number: u32,

    /// Character offset at which the page starts
    pub start_offset: usize,
}

/// Raw text extracted from an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier
    pub id: Uuid,

    /// Where the text came from (stored file path)
    pub source: String,

    /// Extracted text content
    pub text: String,

    /// Page boundaries, ordered by offset. Empty when the format has no pages.
    pub pages: Vec<PageSpan>,
}

impl Document {
    /// Create a new document
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            text: text.into(),
            pages: Vec::new(),
        }
    }

    /// Set page boundaries
    pub fn with_pages(mut self, pages: Vec<PageSpan>) -> Self {
        self.pages = pages;
        self
    }

    /// Page containing the given character offset
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        self.pages
            .iter()
            .take_while(|p| p.start_offset <= offset)
            .last()
            .map(|p| p.number)
    }

    /// Length in characters
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A contiguous span of a document's text; the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier
    pub id: Uuid,

    /// Parent document ID
    pub document_id: Uuid,

    /// Source of the parent document
    pub source: String,

    /// Chunk index within the document
    pub index: u32,

    /// Text content
    pub content: String,

    /// Character offset of the chunk within its document
    pub start_offset: Option<usize>,

    /// Page on which the chunk starts
    pub page: Option<u32>,
}

impl Chunk {
    /// Create a new chunk of the given document
    pub fn new(document: &Document, index: u32, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document.id,
            source: document.source.clone(),
            index,
            content: content.into(),
            start_offset: None,
            page: None,
        }
    }

    /// Length in characters
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Persists uploaded bytes and hands back where they landed
#[async_trait::async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Store an upload, returning the stored path
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Turns a stored file into a [`Document`]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of a file
    fn extract(&self, path: &Path) -> Result<Document>;
}

/// Maps text to fixed-dimension vectors
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Single-shot text completion
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt. No conversational state is kept between calls.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get client name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lookup() {
        let doc = Document::new("a.pdf", "page one\x0cpage two").with_pages(vec![
            PageSpan {
                number: 1,
                start_offset: 0,
            },
            PageSpan {
                number: 2,
                start_offset: 9,
            },
        ]);

        assert_eq!(doc.page_at(0), Some(1));
        assert_eq!(doc.page_at(8), Some(1));
        assert_eq!(doc.page_at(9), Some(2));
        assert_eq!(doc.page_at(100), Some(2));
    }

    #[test]
    fn test_page_lookup_without_pages() {
        let doc = Document::new("notes.txt", "plain text");
        assert_eq!(doc.page_at(3), None);
    }

    #[test]
    fn test_chunk_inherits_document_identity() {
        let doc = Document::new("report.pdf", "The sky is blue.");
        let chunk = Chunk::new(&doc, 3, "sky");

        assert_eq!(chunk.document_id, doc.id);
        assert_eq!(chunk.source, "report.pdf");
        assert_eq!(chunk.index, 3);
        assert_eq!(chunk.start_offset, None);
    }

    #[test]
    fn test_char_count_is_not_bytes() {
        let doc = Document::new("ko.txt", "규정");
        assert_eq!(doc.char_count(), 2);
        assert_eq!(doc.text.len(), 6);
    }

    #[test]
    fn test_config_error_conversion() {
        let err: DocmindError = ConfigError::MissingRequired("OPENAI_API_KEY".to_string()).into();
        assert!(matches!(err, DocmindError::ConfigError(_)));
    }
}
