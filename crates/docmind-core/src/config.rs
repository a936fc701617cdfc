//! DocuMind Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with defaults suitable for a local Ollama setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// RAG pipeline configuration
    pub rag: RagConfig,

    /// Upload storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Overwrite fields from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }

        // Storage
        if let Some(dir) = lookup("DOCMIND_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }

        // RAG
        if let Some(size) = lookup("DOCMIND_CHUNK_SIZE") {
            self.rag.chunk_size = parse_number("DOCMIND_CHUNK_SIZE", size)?;
        }
        if let Some(overlap) = lookup("DOCMIND_CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_number("DOCMIND_CHUNK_OVERLAP", overlap)?;
        }
        if let Some(top_k) = lookup("DOCMIND_TOP_K") {
            self.rag.top_k = parse_number("DOCMIND_TOP_K", top_k)?;
        }
        if let Some(marker) = lookup("DOCMIND_ANSWER_MARKER") {
            // An empty marker disables marker splitting
            self.rag.answer_marker = Some(marker).filter(|m| !m.is_empty());
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

fn parse_number(key: &str, value: String) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend serving both completions and embeddings
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "deepseek-r1:1.5b".to_string(),
            embedding_model: "deepseek-r1:1.5b".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Vector comparison used by the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Record each chunk's start offset in its document
    pub add_start_index: bool,

    /// Number of chunks retrieved per query
    pub top_k: usize,

    /// Similarity metric for retrieval
    pub distance: DistanceMetric,

    /// Maximum context length (characters)
    pub max_context_length: usize,

    /// Text separating model reasoning from the final answer
    pub answer_marker: Option<String>,

    /// Drop `<think>...</think>` blocks from model output
    pub strip_reasoning: bool,

    /// Custom prompt template with `{user_query}` and `{document_context}`
    pub prompt_template: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            add_start_index: true,
            top_k: 4,
            distance: DistanceMetric::Cosine,
            max_context_length: 8000,
            answer_marker: Some("Final Answer:".to_string()),
            strip_reasoning: true,
            prompt_template: None,
        }
    }
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory uploads are written to
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("document_store/pdfs"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "deepseek-r1:1.5b");
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert_eq!(config.rag.top_k, 4);
        assert_eq!(config.rag.answer_marker.as_deref(), Some("Final Answer:"));
        assert_eq!(
            config.storage.upload_dir,
            PathBuf::from("document_store/pdfs")
        );
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup_from(&[
                ("LLM_PROVIDER", "openai"),
                ("OPENAI_API_KEY", "sk-test"),
                ("DOCMIND_CHUNK_SIZE", "500"),
                ("DOCMIND_CHUNK_OVERLAP", "50"),
                ("DOCMIND_UPLOAD_DIR", "/tmp/uploads"),
                ("DOCMIND_ANSWER_MARKER", ""),
            ]))
            .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::OpenAI);
        assert_eq!(config.llm.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.rag.chunk_overlap, 50);
        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.rag.answer_marker, None);
    }

    #[test]
    fn test_env_invalid_number() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(lookup_from(&[("DOCMIND_TOP_K", "four")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DOCMIND_TOP_K"));
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rag]\nchunk_size = 256\ndistance = \"euclidean\"\n\n[llm]\nmodel = \"llama3\""
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rag.chunk_size, 256);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert_eq!(config.rag.distance, DistanceMetric::Euclidean);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/docmind.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
