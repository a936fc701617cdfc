//! Answer generation
//!
//! Assembles retrieved chunks into a context block, fills the prompt
//! template and makes exactly one language-model call per answer. Model
//! failures never escape: they become a fixed user-facing message.

use std::sync::Arc;

use docmind_core::{Chunk, DocmindError, LlmClient, RagConfig, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info};

/// Returned when retrieval produced no context
pub const NO_CONTEXT_MESSAGE: &str = "I couldn't find any relevant information in the document.";

/// Returned when the language model call fails
pub const GENERATION_ERROR_MESSAGE: &str = "An error occurred while generating the response.";

/// Default marker separating visible reasoning from the answer
pub const DEFAULT_ANSWER_MARKER: &str = "Final Answer:";

const QUERY_PLACEHOLDER: &str = "{user_query}";
const CONTEXT_PLACEHOLDER: &str = "{document_context}";

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Default prompt
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are an expert research assistant. Use the provided context to answer the query.
If unsure, state that you don't know. Be concise and factual (max 3 sentences).

Query: {user_query}
Context: {document_context}
Answer:
";

// ============================================================================
// Prompt Template
// ============================================================================

/// Prompt with `{user_query}` and `{document_context}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Parse a template, requiring both placeholders
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [QUERY_PLACEHOLDER, CONTEXT_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(DocmindError::ConfigError(format!(
                    "prompt template is missing {placeholder}"
                )));
            }
        }
        Ok(Self { template })
    }

    /// Substitute query and context in a single left-to-right pass.
    /// Substituted text is never scanned for placeholders.
    pub fn render(&self, query: &str, context: &str) -> String {
        let mut rendered =
            String::with_capacity(self.template.len() + query.len() + context.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(QUERY_PLACEHOLDER, query), (CONTEXT_PLACEHOLDER, context)]
                .into_iter()
                .filter_map(|(placeholder, value)| {
                    rest.find(placeholder).map(|pos| (pos, placeholder, value))
                })
                .min_by_key(|(pos, _, _)| *pos);

            let Some((pos, placeholder, value)) = next else {
                rendered.push_str(rest);
                return rendered;
            };
            rendered.push_str(&rest[..pos]);
            rendered.push_str(value);
            rest = &rest[pos + placeholder.len()..];
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

// ============================================================================
// Answer Extraction
// ============================================================================

/// Post-processing of raw model output
///
/// 1. `<think>...</think>` blocks are removed when `strip_reasoning` is set.
///    If nothing else remains (the model stopped mid-reasoning), only the tags
///    are dropped and the reasoning text is kept.
/// 2. If the marker occurs, the trimmed text after its last occurrence is the
///    answer. A marker with nothing after it yields the text before it.
/// 3. Otherwise the whole trimmed output is the answer.
#[derive(Debug, Clone)]
pub struct AnswerExtractor {
    marker: Option<String>,
    reasoning: Option<Regex>,
}

impl AnswerExtractor {
    /// Create an extractor
    pub fn new(marker: Option<String>, strip_reasoning: bool) -> Result<Self> {
        let reasoning = if strip_reasoning {
            Some(
                Regex::new(r"(?s)<think>.*?(</think>|$)")
                    .map_err(|e| DocmindError::ConfigError(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            marker: marker.filter(|m| !m.is_empty()),
            reasoning,
        })
    }

    /// Extract the final answer from raw output
    pub fn extract(&self, raw: &str) -> String {
        let body = self.strip_reasoning(raw.trim());

        let Some(marker) = &self.marker else {
            return body;
        };
        let Some(pos) = body.rfind(marker.as_str()) else {
            return body;
        };

        let after = body[pos + marker.len()..].trim();
        if after.is_empty() {
            body[..pos].trim().to_string()
        } else {
            after.to_string()
        }
    }

    fn strip_reasoning(&self, raw: &str) -> String {
        let Some(re) = &self.reasoning else {
            return raw.to_string();
        };

        let stripped = re.replace_all(raw, "");
        let stripped = stripped.trim();
        if !stripped.is_empty() {
            return stripped.to_string();
        }

        raw.replace(THINK_OPEN, "")
            .replace(THINK_CLOSE, "")
            .trim()
            .to_string()
    }
}

impl Default for AnswerExtractor {
    fn default() -> Self {
        Self {
            marker: Some(DEFAULT_ANSWER_MARKER.to_string()),
            reasoning: Regex::new(r"(?s)<think>.*?(</think>|$)").ok(),
        }
    }
}

// ============================================================================
// Answer Generator
// ============================================================================

/// How an answer came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Produced by the language model
    Generated,
    /// No context was available, or the model produced nothing usable
    NoContext,
    /// The model call failed
    Failed,
}

/// Final answer text with its provenance
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
}

impl Answer {
    fn no_context() -> Self {
        Self {
            text: NO_CONTEXT_MESSAGE.to_string(),
            kind: AnswerKind::NoContext,
        }
    }
}

/// Generates answers from retrieved chunks
pub struct AnswerGenerator {
    llm_client: Arc<dyn LlmClient>,
    template: PromptTemplate,
    extractor: AnswerExtractor,
    max_context_length: usize,
}

impl AnswerGenerator {
    /// Create a generator with the default template and extractor
    pub fn new(llm_client: Arc<dyn LlmClient>) -> Self {
        Self {
            llm_client,
            template: PromptTemplate::default(),
            extractor: AnswerExtractor::default(),
            max_context_length: RagConfig::default().max_context_length,
        }
    }

    /// Create from config
    pub fn from_config(llm_client: Arc<dyn LlmClient>, config: &RagConfig) -> Result<Self> {
        let template = match &config.prompt_template {
            Some(template) => PromptTemplate::new(template.clone())?,
            None => PromptTemplate::default(),
        };

        Ok(Self {
            llm_client,
            template,
            extractor: AnswerExtractor::new(config.answer_marker.clone(), config.strip_reasoning)?,
            max_context_length: config.max_context_length,
        })
    }

    /// Set the prompt template
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Set the answer extractor
    pub fn with_extractor(mut self, extractor: AnswerExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set the context budget in characters
    pub fn with_max_context_length(mut self, max_context_length: usize) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    /// Answer a query from context chunks
    pub async fn generate(&self, query: &str, context_chunks: &[Chunk]) -> String {
        self.generate_detailed(query, context_chunks).await.text
    }

    /// Answer a query, reporting how the answer was produced
    pub async fn generate_detailed(&self, query: &str, context_chunks: &[Chunk]) -> Answer {
        if context_chunks.is_empty() {
            debug!("no context chunks; skipping model call");
            return Answer::no_context();
        }

        let context = self.build_context(context_chunks);
        let prompt = self.template.render(query, &context);

        info!(
            model = self.llm_client.name(),
            prompt_chars = prompt.chars().count(),
            chunks = context_chunks.len(),
            "calling language model"
        );

        match self.llm_client.complete(&prompt).await {
            Ok(raw) => {
                let text = self.extractor.extract(&raw);
                if text.is_empty() {
                    info!(raw_chars = raw.chars().count(), "language model returned no answer");
                    return Answer::no_context();
                }
                info!(
                    raw_chars = raw.chars().count(),
                    answer_chars = text.chars().count(),
                    "language model responded"
                );
                Answer {
                    text,
                    kind: AnswerKind::Generated,
                }
            }
            Err(e) => {
                error!(model = self.llm_client.name(), error = %e, "error generating answer");
                Answer {
                    text: GENERATION_ERROR_MESSAGE.to_string(),
                    kind: AnswerKind::Failed,
                }
            }
        }
    }

    /// Join chunk texts with blank lines, within the context budget.
    /// The first chunk is always kept.
    fn build_context(&self, chunks: &[Chunk]) -> String {
        let mut context = String::new();
        let mut total_length = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            let length = chunk.char_count();
            if i > 0 {
                if total_length + 2 + length > self.max_context_length {
                    debug!(kept = i, dropped = chunks.len() - i, "context budget reached");
                    break;
                }
                context.push_str("\n\n");
                total_length += 2;
            }
            context.push_str(&chunk.content);
            total_length += length;
        }

        context
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docmind_core::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Language model stub that replays a fixed response
    struct ScriptedLlm {
        response: Option<String>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedLlm {
        fn replying(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            self.response
                .clone()
                .ok_or_else(|| DocmindError::ProviderError("model not loaded".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        let doc = Document::new("doc.txt", "");
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(&doc, i as u32, *t))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_context_skips_model() {
        let llm = ScriptedLlm::replying("should not be used");
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator.generate_detailed("What color is the sky?", &[]).await;

        assert_eq!(answer.text, NO_CONTEXT_MESSAGE);
        assert_eq!(answer.kind, AnswerKind::NoContext);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_marker_splits_reasoning() {
        let llm = ScriptedLlm::replying("reasoning... Final Answer: 42");
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator.generate("meaning of life?", &chunks(&["42 is it."])).await;

        assert_eq!(answer, "42");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_error_becomes_message() {
        let llm = ScriptedLlm::failing();
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator
            .generate_detailed("anything", &chunks(&["context"]))
            .await;

        assert_eq!(answer.text, GENERATION_ERROR_MESSAGE);
        assert_eq!(answer.kind, AnswerKind::Failed);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_truncated_reasoning_is_not_erased() {
        let llm = ScriptedLlm::replying("<think>\nThe user asks about the sky. The context says");
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator
            .generate_detailed("What color is the sky?", &chunks(&["The sky is blue."]))
            .await;

        assert_eq!(answer.kind, AnswerKind::Generated);
        assert_eq!(answer.text, "The user asks about the sky. The context says");
    }

    #[tokio::test]
    async fn test_blank_model_output_becomes_no_context() {
        let llm = ScriptedLlm::replying("<think></think>\n  Final Answer:  ");
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator
            .generate_detailed("What color is the sky?", &chunks(&["The sky is blue."]))
            .await;

        assert_eq!(answer.text, NO_CONTEXT_MESSAGE);
        assert_eq!(answer.kind, AnswerKind::NoContext);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_contains_query_and_ordered_context() {
        let llm = ScriptedLlm::replying("  Blue.  ");
        let generator = AnswerGenerator::new(llm.clone());

        let answer = generator
            .generate(
                "What color is the sky?",
                &chunks(&["The sky is blue.", "Grass is green."]),
            )
            .await;

        assert_eq!(answer, "Blue.");
        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Query: What color is the sky?"));
        assert!(prompt.contains("Context: The sky is blue.\n\nGrass is green."));
        assert!(prompt.contains("max 3 sentences"));
    }

    #[tokio::test]
    async fn test_context_budget_drops_trailing_chunks() {
        let llm = ScriptedLlm::replying("ok");
        let generator = AnswerGenerator::new(llm.clone()).with_max_context_length(12);

        generator
            .generate("q", &chunks(&["0123456789AB", "dropped"]))
            .await;

        let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("0123456789AB"));
        assert!(!prompt.contains("dropped"));
    }

    #[test]
    fn test_template_requires_placeholders() {
        assert!(PromptTemplate::new("Answer {user_query}").is_err());
        assert!(PromptTemplate::new("{document_context} / {user_query}").is_ok());
    }

    #[test]
    fn test_template_render_leaves_query_placeholders_in_context() {
        let template = PromptTemplate::new("Q={user_query} C={document_context}").unwrap();
        assert_eq!(
            template.render("why?", "literal {user_query}"),
            "Q=why? C=literal {user_query}"
        );
    }

    #[test]
    fn test_template_render_context_before_query() {
        let template =
            PromptTemplate::new("Context: {document_context}\nQuery: {user_query}").unwrap();
        assert_eq!(
            template.render("why?", "Use the {user_query} placeholder in templates."),
            "Context: Use the {user_query} placeholder in templates.\nQuery: why?"
        );
    }

    #[test]
    fn test_template_render_repeated_placeholders() {
        let template =
            PromptTemplate::new("{user_query} | {document_context} | {user_query}").unwrap();
        assert_eq!(template.render("q", "{document_context}"), "q | {document_context} | q");
    }

    #[test]
    fn test_extractor_uses_last_marker() {
        let extractor = AnswerExtractor::default();
        assert_eq!(
            extractor.extract("Final Answer: maybe\nFinal Answer:  yes \n"),
            "yes"
        );
    }

    #[test]
    fn test_extractor_without_marker_returns_trimmed() {
        let extractor = AnswerExtractor::default();
        assert_eq!(extractor.extract("\n  The sky is blue.\n"), "The sky is blue.");
    }

    #[test]
    fn test_extractor_trailing_marker_uses_preceding_text() {
        let extractor = AnswerExtractor::default();
        assert_eq!(extractor.extract("It is 42. Final Answer:"), "It is 42.");
        assert_eq!(extractor.extract("Final Answer:"), "");
    }

    #[test]
    fn test_extractor_strips_think_blocks() {
        let extractor = AnswerExtractor::default();
        assert_eq!(
            extractor.extract("<think>\nThe user asks about the sky.\n</think>\n\nThe sky is blue."),
            "The sky is blue."
        );
        assert_eq!(extractor.extract("<think>never closed"), "never closed");
    }

    #[test]
    fn test_custom_marker() {
        let extractor = AnswerExtractor::new(Some("ANSWER:".to_string()), false).unwrap();
        assert_eq!(extractor.extract("thinking ANSWER: blue"), "blue");
        assert_eq!(
            extractor.extract("<think>x</think> Final Answer: 1"),
            "<think>x</think> Final Answer: 1"
        );
    }

    #[test]
    fn test_marker_disabled() {
        let extractor = AnswerExtractor::new(None, true).unwrap();
        assert_eq!(extractor.extract("Final Answer: 42"), "Final Answer: 42");
    }
}
