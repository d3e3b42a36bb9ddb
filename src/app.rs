//! Assembly of the long-lived services from configuration.
//!
//! [`Collaborators`] are the external seams (embeddings, vector index, OCR,
//! internet search, chat model). [`AppComponents`] wires them into the
//! services the HTTP handlers and CLI commands use. Tests build
//! `Collaborators` from fakes and go through the same wiring.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::ingest::DocumentProcessor;
use crate::llm::{create_backend, LlmBackend, LlmService};
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::rag::RagService;
use crate::registry::DocumentRegistry;
use crate::vector_store::{create_index, VectorIndex, VectorStore};
use crate::web_search::{InternetSearch, InternetSearchClient};

pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub ocr: Arc<dyn OcrEngine>,
    pub search: Arc<dyn InternetSearch>,
    pub llm: Arc<dyn LlmBackend>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            embedder: create_provider(&config.embedding)
                .context("Failed to create embedding provider")?,
            index: create_index(&config.vector_store).context("Failed to create vector index")?,
            ocr: Arc::new(TesseractOcr::new(&config.ocr)),
            search: Arc::new(
                InternetSearchClient::new(&config.search)
                    .context("Failed to create search client")?,
            ),
            llm: create_backend(&config.llm).context("Failed to create LLM backend")?,
        })
    }
}

#[derive(Clone)]
pub struct AppComponents {
    pub store: Arc<VectorStore>,
    pub processor: Arc<DocumentProcessor>,
    pub rag: Arc<RagService>,
    pub registry: Arc<DocumentRegistry>,
}

impl AppComponents {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let store = Arc::new(VectorStore::new(
            collaborators.embedder,
            collaborators.index,
            config.retrieval.clone(),
            config.embedding.batch_size,
        ));
        let processor = Arc::new(DocumentProcessor::new(&config.chunking, collaborators.ocr));
        let llm = Arc::new(LlmService::new(collaborators.llm));
        let rag = Arc::new(RagService::new(store.clone(), collaborators.search, llm));
        Self {
            store,
            processor,
            rag,
            registry: Arc::new(DocumentRegistry::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config, Collaborators::from_config(config)?))
    }
}
