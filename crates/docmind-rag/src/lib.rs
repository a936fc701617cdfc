//! DocuMind RAG - Retrieval-Augmented Generation pipeline
//!
//! This crate wires the pieces of a document question-answering session:
//! - File storage for uploads
//! - Retrieval of the chunks nearest to a question
//! - Answer generation with a single language-model call
//! - The orchestrator that sequences ingestion and querying and reports
//!   progress through [`PipelineEvent`]s
//!
//! Author: hephaex@gmail.com

pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod retriever;
pub mod session;
pub mod storage;

pub use generator::{
    Answer, AnswerExtractor, AnswerGenerator, AnswerKind, PromptTemplate,
    DEFAULT_PROMPT_TEMPLATE, GENERATION_ERROR_MESSAGE, NO_CONTEXT_MESSAGE,
};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use pipeline::{RagOrchestrator, RETRIEVAL_ERROR_MESSAGE};
pub use retriever::{Retriever, VectorRetriever};
pub use session::{
    FailedStage, IngestedDocument, IngestionOutcome, IngestionStage, PipelineEvent,
    PipelineStage, QueryStage, SessionState, Upload,
};
pub use storage::LocalFileStorage;
