//! Core data models used throughout the RAG backend.
//!
//! These types represent the chunks, conversation turns, search results and
//! uploaded-document records that flow through ingestion and retrieval.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The file family a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Pdf,
    Docx,
    Image,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Pdf => "pdf",
            ChunkKind::Docx => "docx",
            ChunkKind::Image => "image",
        }
    }
}

impl FromStr for ChunkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ChunkKind::Text),
            "pdf" => Ok(ChunkKind::Pdf),
            "docx" => Ok(ChunkKind::Docx),
            "image" => Ok(ChunkKind::Image),
            other => anyhow::bail!("unknown chunk kind: {}", other),
        }
    }
}

/// A contiguous span of source text, the unit of retrieval.
///
/// Chunks are created by the ingestion pipeline and never mutated
/// afterwards. `id` is a SHA-256 over source, page, index and content, so
/// re-ingesting the same file overwrites its vector records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// Original file name of the uploaded document.
    pub source: String,
    /// 1-based page number, PDFs only.
    pub page: Option<u32>,
    pub kind: ChunkKind,
}

impl Chunk {
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        page: Option<u32>,
        kind: ChunkKind,
        index: usize,
    ) -> Self {
        let content = content.into();
        let source = source.into();

        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0]);
        hasher.update(page.unwrap_or(0).to_le_bytes());
        hasher.update((index as u64).to_le_bytes());
        hasher.update(content.as_bytes());
        let id = format!("{:x}", hasher.finalize());

        Self {
            id,
            content,
            source,
            page,
            kind,
        }
    }

    /// The de-duplication key: two chunks with the same trimmed text and
    /// source are the same fragment.
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.content.trim(), self.source.as_str())
    }
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Role name as understood by OpenAI-compatible chat APIs.
    pub fn api_name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a chat session, normalized once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: String::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: String::new(),
        }
    }
}

/// Returns the most recent `n` turns, oldest first.
pub fn recent_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(n)..]
}

/// A result from the web search provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub link: String,
    pub description: String,
}

/// A result from the academic-paper search provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperResult {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub pdf_url: String,
    /// `YYYY-MM-DD`.
    pub published: String,
}

/// Any auxiliary result rendered into the "Internet Results" context section.
#[derive(Debug, Clone, PartialEq)]
pub enum InternetResult {
    Web(WebResult),
    Paper(PaperResult),
}

impl InternetResult {
    pub fn title(&self) -> &str {
        match self {
            InternetResult::Web(w) => &w.title,
            InternetResult::Paper(p) => &p.title,
        }
    }

    pub fn link(&self) -> &str {
        match self {
            InternetResult::Web(w) => &w.link,
            InternetResult::Paper(p) => &p.pdf_url,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            InternetResult::Web(w) => &w.description,
            InternetResult::Paper(p) => &p.summary,
        }
    }
}

/// Chat model offered to clients. Mapped to a provider model id by config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelChoice {
    #[serde(rename = "llama2-70b")]
    Llama2_70b,
    #[serde(rename = "gpt-oss-120b")]
    GptOss120b,
    #[serde(rename = "gemma-7b")]
    Gemma7b,
    #[serde(rename = "llama3-70b")]
    Llama3_70b,
}

impl ModelChoice {
    pub const ALL: [ModelChoice; 4] = [
        ModelChoice::Llama2_70b,
        ModelChoice::GptOss120b,
        ModelChoice::Gemma7b,
        ModelChoice::Llama3_70b,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelChoice::Llama2_70b => "llama2-70b",
            ModelChoice::GptOss120b => "gpt-oss-120b",
            ModelChoice::Gemma7b => "gemma-7b",
            ModelChoice::Llama3_70b => "llama3-70b",
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelChoice::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown llm choice: {}. Use llama2-70b, gpt-oss-120b, gemma-7b or llama3-70b.",
                    s
                )
            })
    }
}

/// Retrieval strategy requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagVariant {
    Vanilla,
    KnowledgeGraph,
    Hybrid,
}

impl RagVariant {
    pub const ALL: [RagVariant; 3] = [
        RagVariant::Vanilla,
        RagVariant::KnowledgeGraph,
        RagVariant::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RagVariant::Vanilla => "vanilla",
            RagVariant::KnowledgeGraph => "knowledge_graph",
            RagVariant::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RagVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RagVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RagVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown rag variant: {}. Use vanilla, knowledge_graph or hybrid.",
                    s
                )
            })
    }
}

/// Bookkeeping for one uploaded document, kept for the server's lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub upload_time: DateTime<Utc>,
    pub chunks_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}
