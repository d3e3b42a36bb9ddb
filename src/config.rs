//! TOML configuration.
//!
//! Every section and field carries a serde default, so an empty file is a
//! valid configuration (in-memory vector index, embeddings disabled, Groq
//! LLM). Secrets never live in the file: API keys are read from the
//! environment when a provider that needs them is constructed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::models::ModelChoice;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    80
}

/// Weights for the semantic/keyword ensemble used by hybrid search.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Rank offset `c` in `weight / (c + rank)`.
    #[serde(default = "default_rrf_c")]
    pub rrf_c: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            rrf_c: default_rrf_c(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.7
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_rrf_c() -> f64 {
    60.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    /// `memory` or `pinecone`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Pinecone index host, e.g. `https://multimodal-rag-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: None,
            namespace: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `groq` or `gemini`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_groq_url")]
    pub groq_url: String,
    #[serde(default = "default_gemini_url")]
    pub gemini_url: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Overrides for the client-facing model name → Groq model id table.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            groq_url: default_groq_url(),
            gemini_url: default_gemini_url(),
            gemini_model: default_gemini_model(),
            models: HashMap::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_groq_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_gemini_model() -> String {
    "gemma-3-27b-it".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// Resolves a client-facing model choice to the provider's model id.
    pub fn model_id(&self, choice: ModelChoice) -> String {
        if let Some(id) = self.models.get(choice.as_str()) {
            return id.clone();
        }
        match choice {
            ModelChoice::Llama2_70b => "llama2-70b-4096",
            ModelChoice::GptOss120b => "openai/gpt-oss-120b",
            ModelChoice::Gemma7b => "gemma-7b-it",
            ModelChoice::Llama3_70b => "llama-3.3-70b-versatile",
        }
        .to_string()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_ddg_url")]
    pub duckduckgo_url: String,
    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            duckduckgo_url: default_ddg_url(),
            arxiv_url: default_arxiv_url(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_ddg_url() -> String {
    "https://api.duckduckgo.com/".to_string()
}
fn default_arxiv_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}
fn default_search_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract")]
    pub tesseract_path: PathBuf,
    #[serde(default = "default_ocr_lang")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: default_tesseract(),
            language: default_ocr_lang(),
        }
    }
}

fn default_tesseract() -> PathBuf {
    PathBuf::from("tesseract")
}
fn default_ocr_lang() -> String {
    "eng".to_string()
}

/// Reads an environment variable, treating empty values as unset.
pub fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Checks that an embedding provider is configured and that every API
    /// key the configured providers need is present.
    ///
    /// Called before serving so a server that could not index anything, or
    /// a missing key, fails at start-up rather than on the first request.
    pub fn require_keys(&self) -> Result<()> {
        if !self.embedding.is_enabled() {
            bail!(
                "embedding.provider is 'disabled'; set it to openai, ollama, or local \
                 (local needs --features local-embeddings-fastembed)"
            );
        }
        let mut missing = Vec::new();
        match self.llm.provider.as_str() {
            "groq" if env_key("GROQ_API_KEY").is_none() => missing.push("GROQ_API_KEY"),
            "gemini" if env_key("GOOGLE_API_KEY").is_none() => missing.push("GOOGLE_API_KEY"),
            _ => {}
        }
        if self.vector_store.backend == "pinecone" && env_key("PINECONE_API_KEY").is_none() {
            missing.push("PINECONE_API_KEY");
        }
        if self.embedding.provider == "openai" && env_key("OPENAI_API_KEY").is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            bail!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            );
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    let r = &config.retrieval;
    if !r.semantic_weight.is_finite() || !r.keyword_weight.is_finite() {
        bail!("retrieval weights must be finite numbers");
    }
    if r.semantic_weight < 0.0 || r.keyword_weight < 0.0 {
        bail!("retrieval weights must be >= 0");
    }
    if r.semantic_weight + r.keyword_weight <= 0.0 {
        bail!("retrieval weights must not both be zero");
    }
    if !r.rrf_c.is_finite() || r.rrf_c < 0.0 {
        bail!("retrieval.rrf_c must be >= 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.vector_store.backend.as_str() {
        "memory" => {}
        "pinecone" => {
            if config.vector_store.host.is_none() {
                bail!("vector_store.host must be set for the pinecone backend");
            }
        }
        other => bail!(
            "Unknown vector store backend: '{}'. Must be memory or pinecone.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "groq" | "gemini" => {}
        other => bail!("Unknown llm provider: '{}'. Must be groq or gemini.", other),
    }

    Ok(())
}
