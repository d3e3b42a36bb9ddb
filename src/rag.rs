//! RAG orchestration: retrieve, assemble context, prompt, generate.
//!
//! Three retrieval modes share one pipeline:
//!
//! | Variant | Retrieval | Internet | Prompt style |
//! |---------|-----------|----------|--------------|
//! | `vanilla` | similarity, k = 4 | web k = 3 | comprehensive |
//! | `knowledge_graph` | similarity, k = 5, star graph + entities | web k = 3 | kg_reasoning |
//! | `hybrid` | similarity k = 3 ++ hybrid k = 3, de-duplicated | web k = 3, arXiv k = 2 | synthesise |
//!
//! Sub-calls run one after another. A failing retrieval or search call
//! never fails the request: it is logged and contributes nothing. A
//! failing model call becomes the response text.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::context::{
    build_context, build_graph_context, compose_prompt, format_internet_results, PromptStyle,
};
use crate::graph::{extract_entities, KnowledgeGraphView};
use crate::llm::LlmService;
use crate::merge::merge_unique;
use crate::models::{Chunk, ConversationTurn, InternetResult, ModelChoice, RagVariant};
use crate::vector_store::VectorStore;
use crate::web_search::InternetSearch;

const SEMANTIC_K: usize = 4;
const GRAPH_K: usize = 5;
const HYBRID_SEMANTIC_K: usize = 3;
const HYBRID_K: usize = 3;
const WEB_K: usize = 3;
const ARXIV_K: usize = 2;

/// Outcome of one retrieval or search sub-call.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieved<T> {
    Found(Vec<T>),
    Empty,
    Failed(String),
}

impl<T> Retrieved<T> {
    pub fn from_result(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(items) if items.is_empty() => Retrieved::Empty,
            Ok(items) => Retrieved::Found(items),
            Err(e) => Retrieved::Failed(format!("{:#}", e)),
        }
    }

    /// Logs the outcome under `what` and yields the items (none unless found).
    pub fn into_items(self, what: &str) -> Vec<T> {
        match self {
            Retrieved::Found(items) => {
                debug!(source = what, count = items.len(), "retrieved");
                items
            }
            Retrieved::Empty => {
                debug!(source = what, "no results");
                Vec::new()
            }
            Retrieved::Failed(reason) => {
                warn!(source = what, error = %reason, "retrieval failed, continuing without it");
                Vec::new()
            }
        }
    }
}

/// What a chat request gets back.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub response: String,
    /// Source identifier of every chunk placed in the context, in order.
    pub sources: Vec<String>,
    pub chunks_used: usize,
}

pub struct RagService {
    store: Arc<VectorStore>,
    search: Arc<dyn InternetSearch>,
    llm: Arc<LlmService>,
}

impl RagService {
    pub fn new(
        store: Arc<VectorStore>,
        search: Arc<dyn InternetSearch>,
        llm: Arc<LlmService>,
    ) -> Self {
        Self { store, search, llm }
    }

    /// Run the pipeline for `variant` and log the request.
    pub async fn answer(
        &self,
        variant: RagVariant,
        query: &str,
        history: &[ConversationTurn],
        model: ModelChoice,
        use_internet: bool,
    ) -> RagAnswer {
        let start = Instant::now();
        let answer = match variant {
            RagVariant::Vanilla => self.semantic(query, history, model, use_internet).await,
            RagVariant::KnowledgeGraph => self.graph(query, history, model, use_internet).await,
            RagVariant::Hybrid => self.hybrid(query, history, model, use_internet).await,
        };
        info!(
            rag = %variant,
            llm = %model,
            provider = self.llm.backend_name(),
            internet = use_internet,
            chunks = answer.chunks_used,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rag request"
        );
        answer
    }

    pub async fn semantic(
        &self,
        query: &str,
        history: &[ConversationTurn],
        model: ModelChoice,
        use_internet: bool,
    ) -> RagAnswer {
        let docs = self.similar(query, SEMANTIC_K).await;
        let internet = self.internet(query, use_internet, WEB_K, 0).await;
        let context = build_context(&docs, &internet);
        self.generate(&context, &docs, query, history, model, PromptStyle::Comprehensive)
            .await
    }

    pub async fn graph(
        &self,
        query: &str,
        history: &[ConversationTurn],
        model: ModelChoice,
        use_internet: bool,
    ) -> RagAnswer {
        let docs = self.similar(query, GRAPH_K).await;
        let view = KnowledgeGraphView::build(query, &docs);
        let entities = extract_entities(query, &docs);
        debug!(
            nodes = view.node_count(),
            edges = view.edge_count(),
            documents = view.documents().len(),
            entities = entities.len(),
            "knowledge graph built"
        );

        let mut context = build_graph_context(&docs, &entities);
        let internet = self.internet(query, use_internet, WEB_K, 0).await;
        context.push_str(&format_internet_results(&internet));
        self.generate(&context, &docs, query, history, model, PromptStyle::KgReasoning)
            .await
    }

    pub async fn hybrid(
        &self,
        query: &str,
        history: &[ConversationTurn],
        model: ModelChoice,
        use_internet: bool,
    ) -> RagAnswer {
        let semantic = self.similar(query, HYBRID_SEMANTIC_K).await;
        let hybrid = Retrieved::from_result(self.store.hybrid_search(query, HYBRID_K).await)
            .into_items("hybrid");
        let docs = merge_unique(&[&semantic, &hybrid]);

        let internet = self.internet(query, use_internet, WEB_K, ARXIV_K).await;
        let context = build_context(&docs, &internet);
        self.generate(&context, &docs, query, history, model, PromptStyle::Synthesise)
            .await
    }

    async fn similar(&self, query: &str, k: usize) -> Vec<Chunk> {
        Retrieved::from_result(self.store.similarity_search(query, k).await).into_items("semantic")
    }

    async fn internet(
        &self,
        query: &str,
        enabled: bool,
        web_k: usize,
        arxiv_k: usize,
    ) -> Vec<InternetResult> {
        if !enabled {
            return Vec::new();
        }
        let mut results: Vec<InternetResult> =
            Retrieved::from_result(self.search.search_web(query, web_k).await)
                .into_items("web")
                .into_iter()
                .map(InternetResult::Web)
                .collect();
        if arxiv_k > 0 {
            results.extend(
                Retrieved::from_result(self.search.search_papers(query, arxiv_k).await)
                    .into_items("arxiv")
                    .into_iter()
                    .map(InternetResult::Paper),
            );
        }
        results
    }

    async fn generate(
        &self,
        context: &str,
        docs: &[Chunk],
        query: &str,
        history: &[ConversationTurn],
        model: ModelChoice,
        style: PromptStyle,
    ) -> RagAnswer {
        let prompt = compose_prompt(context, history, query, style);
        debug!(context_chars = context.len(), prompt_chars = prompt.len(), "prompt composed");
        let response = self.llm.generate(&prompt, model, history).await;
        RagAnswer {
            response,
            sources: docs.iter().map(|d| d.source.clone()).collect(),
            chunks_used: docs.len(),
        }
    }
}
