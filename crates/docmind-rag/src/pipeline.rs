//! Pipeline orchestrator
//!
//! Sequences ingestion (save, extract, chunk, index) and querying
//! (retrieve, generate) against a shared vector index. Collaborator errors
//! are logged with full detail and reported to the session as fixed
//! user-facing messages; `ingest` and `ask` never return an error.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use docmind_core::{
    AppConfig, DocmindError, Document, DocumentExtractor, DocumentStorage, EmbeddingProvider,
    LlmClient, RagConfig, Result,
};
use docmind_parser::{ChunkConfig, ParserRegistry, TextSplitter};
use docmind_vector::{create_embedding_provider, InMemoryVectorIndex, VectorIndex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

use crate::generator::{Answer, AnswerGenerator, AnswerKind};
use crate::llm::create_llm_client;
use crate::retriever::{Retriever, VectorRetriever};
use crate::session::{
    FailedStage, IngestedDocument, IngestionOutcome, IngestionStage, PipelineEvent, QueryStage,
    SessionState, Upload,
};
use crate::storage::LocalFileStorage;

/// Recorded when the index cannot be searched
pub const RETRIEVAL_ERROR_MESSAGE: &str =
    "An error occurred while searching for related documents.";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// RAG pipeline over a single shared index
pub struct RagOrchestrator {
    storage: Arc<dyn DocumentStorage>,
    extractor: Arc<dyn DocumentExtractor>,
    splitter: TextSplitter,
    index: Arc<dyn VectorIndex>,
    retriever: Arc<dyn Retriever>,
    generator: AnswerGenerator,
    events: broadcast::Sender<PipelineEvent>,
}

impl RagOrchestrator {
    /// Assemble a pipeline from its collaborators
    pub fn new(
        storage: Arc<dyn DocumentStorage>,
        extractor: Arc<dyn DocumentExtractor>,
        index: Arc<dyn VectorIndex>,
        llm_client: Arc<dyn LlmClient>,
        config: &RagConfig,
    ) -> Result<Self> {
        let splitter = TextSplitter::new(ChunkConfig::from(config))?;
        let retriever = VectorRetriever::new(index.clone()).with_top_k(config.top_k);
        let generator = AnswerGenerator::from_config(llm_client, config)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            storage,
            extractor,
            splitter,
            index,
            retriever: Arc::new(retriever),
            generator,
            events,
        })
    }

    /// Build the default local pipeline: file storage, PDF/text extraction,
    /// in-memory index and the configured model backends
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(create_embedding_provider(&config.llm)?);
        let llm_client: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
        let index = Arc::new(InMemoryVectorIndex::with_metric(
            embedder,
            config.rag.distance,
        ));

        info!(
            provider = ?config.llm.provider,
            model = %config.llm.model,
            embedding_model = %config.llm.embedding_model,
            upload_dir = %config.storage.upload_dir.display(),
            "pipeline configured"
        );

        Self::new(
            Arc::new(LocalFileStorage::from_config(&config.storage)),
            Arc::new(ParserRegistry::with_default_parsers()),
            index,
            llm_client,
            &config.rag,
        )
    }

    /// Replace the retriever
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    /// Receive progress events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Shared index handle
    pub fn index(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }

    /// Save, extract, chunk and index an upload
    #[instrument(skip_all, fields(file_name = %upload.file_name, bytes = upload.bytes.len()))]
    pub async fn ingest(&self, state: &mut SessionState, upload: Upload) -> IngestionOutcome {
        state.last_error = None;

        self.enter_ingestion(state, IngestionStage::Saving);
        let stored_path = match self.storage.save(&upload.file_name, &upload.bytes).await {
            Ok(path) => path,
            Err(e) => return self.fail(state, FailedStage::Saving, &e),
        };

        self.enter_ingestion(state, IngestionStage::Extracting);
        let document = match self.extract(stored_path.clone()).await {
            Ok(document) => document,
            Err(e) => return self.fail(state, FailedStage::Extracting, &e),
        };
        debug!(
            document_id = %document.id,
            chars = document.char_count(),
            pages = document.pages.len(),
            "document extracted"
        );

        self.enter_ingestion(state, IngestionStage::Chunking);
        let chunks = self.splitter.chunk(&document);
        if chunks.is_empty() {
            let e = DocmindError::ChunkingError("document produced no chunks".to_string());
            return self.fail(state, FailedStage::Chunking, &e);
        }
        debug!(chunks = chunks.len(), "document chunked");

        self.enter_ingestion(state, IngestionStage::Indexing);
        let chunk_count = match self.index.add(chunks).await {
            Ok(count) => count,
            Err(e) => return self.fail(state, FailedStage::Indexing, &e),
        };

        state.index_ready = true;
        state.documents.push(IngestedDocument {
            document_id: document.id,
            file_name: upload.file_name,
            stored_path,
            chunk_count,
            ingested_at: Utc::now(),
        });
        self.enter_ingestion(state, IngestionStage::Ready);

        info!(
            document_id = %document.id,
            chunk_count,
            total_chunks = state.chunk_count(),
            "document ingested"
        );
        IngestionOutcome::Indexed {
            document_id: document.id,
            chunk_count,
        }
    }

    /// Answer a question from the indexed documents
    #[instrument(skip_all, fields(question_chars = question.chars().count()))]
    pub async fn ask(&self, state: &mut SessionState, question: &str) -> Answer {
        state.last_error = None;

        self.enter_query(state, QueryStage::Retrieving);
        let chunks = if state.index_ready {
            match self.retriever.try_retrieve(question).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    error!(error = %e, "retrieval failed");
                    state.last_error = Some(RETRIEVAL_ERROR_MESSAGE.to_string());
                    Vec::new()
                }
            }
        } else {
            debug!("no document indexed yet; skipping retrieval");
            Vec::new()
        };

        self.enter_query(state, QueryStage::Generating);
        let answer = self.generator.generate_detailed(question, &chunks).await;
        if answer.kind == AnswerKind::Failed {
            state.last_error = Some(answer.text.clone());
        }

        self.enter_query(state, QueryStage::Idle);
        info!(kind = ?answer.kind, context_chunks = chunks.len(), "question answered");
        answer
    }

    async fn extract(&self, path: PathBuf) -> Result<Document> {
        let extractor = self.extractor.clone();
        // A panicking parser surfaces as a JoinError; the release profile unwinds
        tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| DocmindError::ExtractionError(format!("extraction task failed: {e}")))?
    }

    fn fail(
        &self,
        state: &mut SessionState,
        stage: FailedStage,
        err: &DocmindError,
    ) -> IngestionOutcome {
        error!(stage = ?stage, error = %err, "ingestion failed");

        let message = stage.message().to_string();
        state.last_error = Some(message.clone());
        self.enter_ingestion(state, IngestionStage::Failed(stage));

        IngestionOutcome::Failed { stage, message }
    }

    fn enter_ingestion(&self, state: &mut SessionState, stage: IngestionStage) {
        state.ingestion_stage = stage;
        self.emit(PipelineEvent::from(stage));
    }

    fn enter_query(&self, state: &mut SessionState, stage: QueryStage) {
        state.query_stage = stage;
        self.emit(PipelineEvent::from(stage));
    }

    fn emit(&self, event: PipelineEvent) {
        debug!(stage = %event.stage, percent = event.percent, "pipeline event");
        // Err only means nobody is listening
        let _ = self.events.send(event);
    }
}
