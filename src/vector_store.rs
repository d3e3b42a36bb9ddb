//! Vector store adapter: embeddings + vector index + keyword cache.
//!
//! [`VectorStore`] is the single entry point the orchestrator and the
//! upload handlers use. It owns three collaborators:
//!
//! - an [`EmbeddingProvider`] that turns chunk and query text into vectors;
//! - a [`VectorIndex`] backend holding the vectors (in-process
//!   [`InMemoryIndex`] or the hosted [`PineconeIndex`]);
//! - a [`KeywordIndex`] over every chunk added during this process's
//!   lifetime, used for the keyword half of hybrid search.
//!
//! # Hybrid search
//!
//! ```text
//! keyword cache empty? ── yes ──▶ similarity_search(query, k)
//!        │ no
//!        ▼
//! semantic top-k ─┐
//!                 ├─ weighted RRF (0.7 / 0.3, c = 60) ─▶ fused, de-duplicated
//! BM25 top-k ─────┘
//!        │ ensemble failed (semantic error or invalid weights)
//!        ▼
//! semantic ++ keyword, de-duplicated, capped at 2k
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{env_key, RetrievalConfig, VectorStoreConfig};
use crate::embedding::{cosine_similarity, embed_batched, embed_query, EmbeddingProvider};
use crate::keyword::KeywordIndex;
use crate::merge::{merge_unique, weighted_rrf};
use crate::models::{Chunk, ChunkKind};

/// Storage backend for chunk vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &str;
    /// Insert or replace records keyed by chunk id. `vectors[i]` belongs to `chunks[i]`.
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;
    /// Top `k` chunks by similarity to `vector`, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>>;
    /// Delete every record.
    async fn clear(&self) -> Result<()>;
}

/// Create the [`VectorIndex`] named by `vector_store.backend`.
pub fn create_index(config: &VectorStoreConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config)?)),
        other => bail!("Unknown vector store backend: {}", other),
    }
}

// ============ In-memory backend ============

/// Brute-force cosine similarity over vectors held in process memory.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "upsert of {} chunks with {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("vector index lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            match records.iter_mut().find(|(c, _)| c.id == chunk.id) {
                Some(existing) => *existing = (chunk.clone(), vector.clone()),
                None => records.push((chunk.clone(), vector.clone())),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("vector index lock poisoned"))?;
        let mut scored: Vec<(f32, &Chunk)> = records
            .iter()
            .map(|(chunk, v)| (cosine_similarity(vector, v), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.records
            .write()
            .map_err(|_| anyhow::anyhow!("vector index lock poisoned"))?
            .clear();
        Ok(())
    }
}

// ============ Pinecone backend ============

const PINECONE_UPSERT_BATCH: usize = 100;

/// Hosted Pinecone index via its data-plane REST API.
/// Requires the `PINECONE_API_KEY` environment variable.
pub struct PineconeIndex {
    host: String,
    namespace: Option<String>,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector_store.host required for Pinecone backend"))?;
        let api_key = env_key("PINECONE_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            api_key,
            client,
        })
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let Some(ns) = &self.namespace {
            body["namespace"] = json!(ns);
        }
        let response = self
            .client
            .post(format!("{}/{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone {} request failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {}: {}", status, body_text);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn pinecone_record(chunk: &Chunk, vector: &[f32]) -> Value {
    let mut metadata = json!({
        "text": chunk.content,
        "source": chunk.source,
        "kind": chunk.kind.as_str(),
    });
    if let Some(page) = chunk.page {
        metadata["page"] = json!(page);
    }
    json!({ "id": chunk.id, "values": vector, "metadata": metadata })
}

/// Rebuilds chunks from a `query` response's `matches[]`.
fn parse_pinecone_matches(json: &Value) -> Result<Vec<Chunk>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone response: missing matches array"))?;

    let mut chunks = Vec::with_capacity(matches.len());
    for m in matches {
        let Some(metadata) = m.get("metadata") else {
            continue;
        };
        let field = |name: &str| metadata.get(name).and_then(|v| v.as_str());
        let Some(text) = field("text") else {
            continue;
        };
        chunks.push(Chunk {
            id: m
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            content: text.to_string(),
            source: field("source").unwrap_or("unknown").to_string(),
            page: metadata
                .get("page")
                .and_then(|p| p.as_f64())
                .map(|p| p as u32),
            kind: field("kind")
                .and_then(|k| k.parse().ok())
                .unwrap_or(ChunkKind::Text),
        });
    }
    Ok(chunks)
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn backend_name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "upsert of {} chunks with {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let records: Vec<Value> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, v)| pinecone_record(c, v))
            .collect();
        for batch in records.chunks(PINECONE_UPSERT_BATCH) {
            self.post("vectors/upsert", json!({ "vectors": batch }))
                .await?;
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>> {
        let body = json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
        });
        let response = self.post("query", body).await?;
        parse_pinecone_matches(&response)
    }

    async fn clear(&self) -> Result<()> {
        self.post("vectors/delete", json!({ "deleteAll": true }))
            .await?;
        Ok(())
    }
}

// ============ Adapter ============

pub struct VectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    keyword: RwLock<KeywordIndex>,
    retrieval: RetrievalConfig,
    batch_size: usize,
}

impl VectorStore {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        retrieval: RetrievalConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            keyword: RwLock::new(KeywordIndex::new()),
            retrieval,
            batch_size,
        }
    }

    /// Embed, index and cache `chunks`. Returns the number indexed, or 0
    /// (after logging) when embedding or indexing fails.
    pub async fn add(&self, chunks: &[Chunk]) -> usize {
        if chunks.is_empty() {
            return 0;
        }
        match self.try_add(chunks).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, chunks = chunks.len(), "failed to add chunks to vector store");
                0
            }
        }
    }

    async fn try_add(&self, chunks: &[Chunk]) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.batch_size).await?;
        self.index.upsert(chunks, &vectors).await?;
        self.keyword_index_mut()?.add(chunks);
        info!(
            chunks = chunks.len(),
            backend = self.index.backend_name(),
            "chunks indexed"
        );
        Ok(chunks.len())
    }

    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        self.index.query(&vector, k).await
    }

    /// Semantic + BM25 retrieval fused by weighted reciprocal rank.
    pub async fn hybrid_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if self.chunk_count() == 0 {
            debug!("keyword cache empty, hybrid search uses similarity only");
            return self.similarity_search(query, k).await;
        }

        let keyword = self.keyword_search(query, k);
        match self.ensemble(query, k, &keyword).await {
            Ok(fused) => Ok(fused),
            Err(e) => {
                warn!(error = %e, "ensemble retrieval failed, merging retrievers independently");
                let semantic = match self.similarity_search(query, k).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(error = %e, "semantic retrieval failed");
                        Vec::new()
                    }
                };
                let mut merged = merge_unique(&[&semantic, &keyword]);
                merged.truncate(2 * k);
                Ok(merged)
            }
        }
    }

    async fn ensemble(&self, query: &str, k: usize, keyword: &[Chunk]) -> Result<Vec<Chunk>> {
        let semantic = self.similarity_search(query, k).await?;
        weighted_rrf(
            &[
                (&semantic, self.retrieval.semantic_weight),
                (keyword, self.retrieval.keyword_weight),
            ],
            self.retrieval.rrf_c,
        )
    }

    fn keyword_search(&self, query: &str, k: usize) -> Vec<Chunk> {
        match self.keyword.read() {
            Ok(index) => index.search(query, k).into_iter().map(|(c, _)| c).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn keyword_index_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, KeywordIndex>> {
        self.keyword
            .write()
            .map_err(|_| anyhow::anyhow!("keyword index lock poisoned"))
    }

    /// Drop every indexed chunk, both from the vector index and the keyword cache.
    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await?;
        self.keyword_index_mut()?.clear();
        Ok(())
    }

    /// Number of chunks in the keyword cache.
    pub fn chunk_count(&self) -> usize {
        self.keyword.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn backend_name(&self) -> &str {
        self.index.backend_name()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::embedding::DisabledProvider;
    use std::collections::HashSet;

    fn chunk(text: &str, source: &str) -> Chunk {
        Chunk::new(text, source, None, ChunkKind::Text, 0)
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("tokio runtime schedules async tasks", "tokio.md"),
            chunk("serde derives serialize and deserialize", "serde.md"),
            chunk("axum routes requests to async handlers", "axum.md"),
        ]
    }

    #[tokio::test]
    async fn add_indexes_and_caches() {
        let store = memory_store(Arc::new(HashEmbedder { dims: 64 }));
        assert_eq!(store.add(&corpus()).await, 3);
        assert_eq!(store.chunk_count(), 3);

        let hits = store.similarity_search("serde serialize", 1).await.unwrap();
        assert_eq!(hits[0].source, "serde.md");
    }

    #[tokio::test]
    async fn add_failure_returns_zero_and_caches_nothing() {
        let store = memory_store(Arc::new(DisabledProvider));
        assert_eq!(store.add(&corpus()).await, 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let store = memory_store(Arc::new(HashEmbedder { dims: 32 }));
        store.add(&corpus()).await;
        store.add(&corpus()[..1]).await;
        let all = store.similarity_search("anything", 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(store.chunk_count(), 3);
    }

    #[tokio::test]
    async fn re_ingesting_keeps_keyword_cache_in_step_with_index() {
        let store = memory_store(Arc::new(HashEmbedder { dims: 64 }));
        for _ in 0..3 {
            assert_eq!(store.add(&corpus()).await, 3);
        }
        let indexed = store.similarity_search("anything", 10).await.unwrap();
        assert_eq!(store.chunk_count(), indexed.len());

        let keyword = store.keyword_search("async", 3);
        assert_eq!(keyword.len(), 2);
        let ids: HashSet<_> = keyword.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), keyword.len());
    }

    #[tokio::test]
    async fn hybrid_with_empty_cache_equals_similarity() {
        let index = Arc::new(InMemoryIndex::new());
        let embedder = Arc::new(HashEmbedder { dims: 64 });
        let docs = corpus();
        let vectors = embedder
            .embed(&docs.iter().map(|c| c.content.clone()).collect::<Vec<_>>())
            .await
            .unwrap();
        // Records present in the index from an earlier process; cache is empty.
        index.upsert(&docs, &vectors).await.unwrap();

        let store = VectorStore::new(embedder, index, RetrievalConfig::default(), 8);
        assert_eq!(store.chunk_count(), 0);
        let hybrid = store.hybrid_search("async handlers", 2).await.unwrap();
        let similar = store.similarity_search("async handlers", 2).await.unwrap();
        assert_eq!(hybrid, similar);
    }

    #[tokio::test]
    async fn hybrid_fuses_without_duplicates() {
        let store = memory_store(Arc::new(HashEmbedder { dims: 64 }));
        store.add(&corpus()).await;
        let results = store.hybrid_search("async tasks", 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 4);
        assert_eq!(results[0].source, "tokio.md");
        let keys: HashSet<_> = results.iter().map(|c| c.dedup_key()).collect();
        assert_eq!(keys.len(), results.len());
    }

    #[tokio::test]
    async fn invalid_weights_fall_back_to_capped_merge() {
        let store = VectorStore::new(
            Arc::new(HashEmbedder { dims: 64 }),
            Arc::new(InMemoryIndex::new()),
            RetrievalConfig {
                semantic_weight: -1.0,
                keyword_weight: 0.3,
                rrf_c: 60.0,
            },
            8,
        );
        let mut docs = corpus();
        docs.push(chunk("async closures and async blocks", "async.md"));
        store.add(&docs).await;

        let results = store.hybrid_search("async", 1).await.unwrap();
        assert!(results.len() <= 2);
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn failing_semantic_side_keeps_keyword_results() {
        // Cache populated, but every query embedding fails.
        let broken = memory_store(Arc::new(DisabledProvider));
        broken.keyword_index_mut().unwrap().add(&corpus());

        let results = broken.hybrid_search("serde", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "serde.md");
        assert!(broken.similarity_search("serde", 3).await.is_err());
    }

    #[tokio::test]
    async fn clear_empties_index_and_cache() {
        let store = memory_store(Arc::new(HashEmbedder { dims: 64 }));
        store.add(&corpus()).await;
        store.clear().await.unwrap();
        assert_eq!(store.chunk_count(), 0);
        assert!(store.similarity_search("tokio", 3).await.unwrap().is_empty());
    }

    #[test]
    fn pinecone_matches_rebuild_chunks() {
        let json = serde_json::json!({
            "matches": [
                {
                    "id": "abc",
                    "score": 0.91,
                    "metadata": { "text": "page text", "source": "paper.pdf", "page": 3.0, "kind": "pdf" }
                },
                { "id": "no-metadata", "score": 0.5 }
            ]
        });
        let chunks = parse_pinecone_matches(&json).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "abc");
        assert_eq!(chunks[0].page, Some(3));
        assert_eq!(chunks[0].kind, ChunkKind::Pdf);
        assert!(parse_pinecone_matches(&serde_json::json!({})).is_err());
    }

    #[test]
    fn pinecone_record_carries_metadata() {
        let c = Chunk::new("hello", "a.pdf", Some(2), ChunkKind::Pdf, 0);
        let record = pinecone_record(&c, &[0.5, 0.5]);
        assert_eq!(record["id"], c.id.as_str());
        assert_eq!(record["metadata"]["page"], 2);
        assert_eq!(record["metadata"]["source"], "a.pdf");
    }
}
