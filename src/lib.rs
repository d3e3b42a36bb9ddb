//! # Multi-Modal RAG
//!
//! A retrieval-augmented chat backend over user-uploaded documents (text,
//! Markdown, PDF, DOCX, images via OCR), with optional web and arXiv
//! results, served over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Ingestion   │──▶│ Embeddings   │──▶│  Vector index     │
//! │ txt/pdf/docx │   │ (provider)   │   │ memory / Pinecone │
//! │ images (OCR) │   └──────────────┘   ├──────────────────┤
//! └──────────────┘                      │  BM25 cache       │
//!                                       └────────┬─────────┘
//!                                                │
//! ┌──────────────┐   ┌──────────────┐   ┌────────▼─────────┐
//! │  HTTP (axum) │──▶│ Orchestrator │◀──│ DuckDuckGo/arXiv │
//! │  CLI (mmrag) │   │ vanilla/kg/  │   └──────────────────┘
//! └──────────────┘   │ hybrid       │──▶ Groq / Gemini
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! mmrag serve
//! curl -F file=@paper.pdf http://localhost:8000/upload
//! curl -X POST "http://localhost:8000/direct-chat?message=Summarise%20the%20paper&rag=hybrid"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Fixed-size overlapping text chunking |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`ocr`] | Image OCR via tesseract |
//! | [`ingest`] | File-type dispatch, bytes to chunks |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`keyword`] | In-memory BM25 index |
//! | [`merge`] | De-duplicating merge and reciprocal rank fusion |
//! | [`vector_store`] | Vector index backends and the retrieval adapter |
//! | [`web_search`] | Web and academic-paper search |
//! | [`llm`] | Chat-model backends |
//! | [`graph`] | Per-request knowledge graph and entity extraction |
//! | [`context`] | Context and prompt assembly |
//! | [`rag`] | Retrieval-mode orchestration |
//! | [`registry`] | Uploaded-document bookkeeping |
//! | [`app`] | Service wiring |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod app;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod keyword;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod models;
pub mod ocr;
pub mod rag;
pub mod registry;
pub mod server;
pub mod vector_store;
pub mod web_search;
