//! Session state and progress events
//!
//! A [`SessionState`] belongs to one user session and is passed to the
//! orchestrator by `&mut` for each request. Stage transitions are reported
//! as [`PipelineEvent`]s for whatever presentation layer is listening.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Ingestion step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Saving,
    Extracting,
    Chunking,
    Indexing,
}

impl FailedStage {
    /// User-facing message for a failure at this step
    pub fn message(self) -> &'static str {
        match self {
            Self::Saving => "An error occurred while saving the file. Please try again.",
            Self::Extracting => {
                "An error occurred while loading the document. Please check the file format."
            }
            Self::Chunking => "An error occurred while processing the document chunks.",
            Self::Indexing => "An error occurred while indexing the document.",
        }
    }
}

/// Progress of the most recent upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    #[default]
    Idle,
    Saving,
    Extracting,
    Chunking,
    Indexing,
    Ready,
    Failed(FailedStage),
}

impl IngestionStage {
    /// Progress percentage reported when entering this stage
    pub fn percent(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Saving => 10,
            Self::Extracting => 30,
            Self::Chunking => 55,
            Self::Indexing => 75,
            Self::Ready | Self::Failed(_) => 100,
        }
    }

    /// Status line shown while in this stage
    pub fn status(self) -> &'static str {
        match self {
            Self::Idle => "Waiting for a document",
            Self::Saving => "Uploading and processing your document...",
            Self::Extracting => "Loading document...",
            Self::Chunking => "Splitting document into chunks...",
            Self::Indexing => "Indexing document...",
            Self::Ready => "Document processed successfully! Ask your questions below.",
            Self::Failed(stage) => stage.message(),
        }
    }
}

/// Progress of the current question
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    #[default]
    Idle,
    Retrieving,
    Generating,
}

impl QueryStage {
    /// Progress percentage reported when entering this stage
    pub fn percent(self) -> u8 {
        match self {
            Self::Retrieving => 25,
            Self::Generating => 60,
            Self::Idle => 100,
        }
    }

    /// Status line shown while in this stage
    pub fn status(self) -> &'static str {
        match self {
            Self::Retrieving => "Analyzing document...",
            Self::Generating => "Generating answer...",
            Self::Idle => "Analysis complete!",
        }
    }
}

/// Either side of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "pipeline", content = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Ingestion(IngestionStage),
    Query(QueryStage),
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingestion(IngestionStage::Failed(stage)) => {
                write!(f, "ingestion:failed({stage:?})")
            }
            Self::Ingestion(stage) => write!(f, "ingestion:{stage:?}"),
            Self::Query(stage) => write!(f, "query:{stage:?}"),
        }
    }
}

/// A stage transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineEvent {
    pub stage: PipelineStage,
    pub status: String,
    pub percent: u8,
}

impl From<IngestionStage> for PipelineEvent {
    fn from(stage: IngestionStage) -> Self {
        Self {
            stage: PipelineStage::Ingestion(stage),
            status: stage.status().to_string(),
            percent: stage.percent(),
        }
    }
}

impl From<QueryStage> for PipelineEvent {
    fn from(stage: QueryStage) -> Self {
        Self {
            stage: PipelineStage::Query(stage),
            status: stage.status().to_string(),
            percent: stage.percent(),
        }
    }
}

/// A successfully indexed upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub document_id: Uuid,
    pub file_name: String,
    pub stored_path: PathBuf,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Per-session request state
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub ingestion_stage: IngestionStage,
    pub query_stage: QueryStage,

    /// At least one upload has been indexed. Never cleared by a later failure.
    pub index_ready: bool,

    /// User-facing message from a failure in the most recent request
    pub last_error: Option<String>,

    pub documents: Vec<IngestedDocument>,
}

impl SessionState {
    /// Fresh session
    pub fn new() -> Self {
        Self::default()
    }

    /// Total chunks indexed in this session
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|d| d.chunk_count).sum()
    }
}

/// An uploaded file
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Result of one ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// The document was indexed
    Indexed { document_id: Uuid, chunk_count: usize },
    /// Ingestion stopped at the given step
    Failed { stage: FailedStage, message: String },
}

impl IngestionOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed { .. })
    }
}
