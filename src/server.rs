//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Chat with JSON body (message, history, model, variant, internet flag) |
//! | `POST` | `/direct-chat` | Chat via query parameters, empty history |
//! | `POST` | `/upload` | Ingest a multipart file upload (field `file`) |
//! | `POST` | `/direct-upload` | Ingest a file already on the server's disk |
//! | `GET`  | `/documents` | List uploaded documents |
//! | `DELETE` | `/documents` | Clear the document list (vector store untouched) |
//! | `GET`  | `/health` | Health check |
//! | `GET`  | `/` | API information |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_file_type", "message": "Unsupported file type: xyz. ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_file_type` (400),
//! `not_found` (404), `ingest_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use std::path::Path;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::AppComponents;
use crate::config::Config;
use crate::ingest::{file_extension, is_supported, IngestError, SUPPORTED_FILE_TYPES};
use crate::models::{
    ConversationTurn, ModelChoice, RagVariant, Role, UploadedDocumentRecord,
};

const SERVICE_NAME: &str = "Multi-Modal RAG Chatbot";
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Starts the HTTP server with collaborators built from `config`.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let components = AppComponents::from_config(config)?;
    run_server_with(config, components).await
}

/// Starts the HTTP server with pre-built components.
pub async fn run_server_with(config: &Config, components: AppComponents) -> anyhow::Result<()> {
    let app = router(components);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "RAG server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(components: AppComponents) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/direct-chat", post(handle_direct_chat))
        .route("/upload", post(handle_upload))
        .route("/direct-upload", post(handle_direct_upload))
        .route(
            "/documents",
            get(handle_list_documents).delete(handle_clear_documents),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(components)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn unsupported_file_type(extension: &str) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "unsupported_file_type",
        message: format!(
            "Unsupported file type: {}. Supported types: {}",
            extension,
            SUPPORTED_FILE_TYPES.join(", ")
        ),
    }
}

fn ingest_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "ingest_failed",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnsupportedFileType(ext) => unsupported_file_type(&ext),
            IngestError::Extract(e) => ingest_failed(e.to_string()),
        }
    }
}

// ============ GET / and GET /health ============

async fn handle_root(State(app): State<AppComponents>) -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("{} API", SERVICE_NAME),
        "endpoints": {
            "POST /chat": "Chat with the AI (JSON body)",
            "POST /direct-chat": "Direct chat using ALL uploaded documents",
            "POST /upload": "Upload document via file upload",
            "POST /direct-upload": "Upload document via file path",
            "GET /documents": "List all uploaded documents",
            "DELETE /documents": "Clear all uploaded documents",
            "GET /health": "Basic health check",
            "GET /": "This information page",
        },
        "available_llms": ModelChoice::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "available_rag_variants": RagVariant::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
        "supported_file_types": SUPPORTED_FILE_TYPES,
        "current_documents_count": app.registry.len(),
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    documents_available: usize,
}

async fn handle_health(State(app): State<AppComponents>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        documents_available: app.registry.len(),
    })
}

// ============ POST /chat ============

/// One prior message as sent by the client.
#[derive(Deserialize)]
struct ChatMessage {
    message: String,
    is_user: bool,
    #[serde(default)]
    timestamp: String,
}

impl From<ChatMessage> for ConversationTurn {
    fn from(m: ChatMessage) -> Self {
        ConversationTurn {
            role: if m.is_user { Role::User } else { Role::Assistant },
            text: m.message,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
    llm_choice: ModelChoice,
    rag_variant: RagVariant,
    #[serde(default)]
    use_internet_search: bool,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
    /// Seconds.
    processing_time: f64,
}

async fn handle_chat(
    State(app): State<AppComponents>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let start = Instant::now();
    let history: Vec<ConversationTurn> = req
        .conversation_history
        .into_iter()
        .map(ConversationTurn::from)
        .collect();
    let answer = app
        .rag
        .answer(
            req.rag_variant,
            &req.message,
            &history,
            req.llm_choice,
            req.use_internet_search,
        )
        .await;

    Ok(Json(ChatResponse {
        response: answer.response,
        sources: answer.sources,
        processing_time: start.elapsed().as_secs_f64(),
    }))
}

// ============ POST /direct-chat ============

#[derive(Deserialize)]
struct DirectChatParams {
    message: String,
    llm: Option<String>,
    rag: Option<String>,
    use_internet: Option<bool>,
}

#[derive(Serialize)]
struct DirectChatResponse {
    response: String,
    sources: Vec<String>,
    processing_time: f64,
    llm_used: ModelChoice,
    rag_used: RagVariant,
    internet_search: bool,
    available_documents: usize,
}

async fn handle_direct_chat(
    State(app): State<AppComponents>,
    params: Result<Query<DirectChatParams>, QueryRejection>,
) -> Result<Json<DirectChatResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    if params.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let llm: ModelChoice = match params.llm.as_deref() {
        Some(s) => s.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => ModelChoice::Llama2_70b,
    };
    let rag: RagVariant = match params.rag.as_deref() {
        Some(s) => s.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => RagVariant::Vanilla,
    };
    let use_internet = params.use_internet.unwrap_or(false);

    let start = Instant::now();
    let answer = app
        .rag
        .answer(rag, &params.message, &[], llm, use_internet)
        .await;

    Ok(Json(DirectChatResponse {
        response: answer.response,
        sources: answer.sources,
        processing_time: start.elapsed().as_secs_f64(),
        llm_used: llm,
        rag_used: rag,
        internet_search: use_internet,
        available_documents: app.registry.len(),
    }))
}

// ============ Ingestion ============

/// Process and index one file. Returns the number of chunks indexed.
async fn ingest_bytes(app: &AppComponents, bytes: &[u8], file_name: &str) -> Result<usize, AppError> {
    let chunks = app.processor.process(bytes, file_name).await?;
    let indexed = app.store.add(&chunks).await;
    info!(file = file_name, chunks = chunks.len(), indexed, "document ingested");
    Ok(indexed)
}

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    document_id: String,
    chunks_processed: usize,
}

async fn handle_upload(
    State(app): State<AppComponents>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(|n| n.to_string())
            .ok_or_else(|| bad_request("file field has no file name"))?;
        let ext = file_extension(&file_name);
        if !is_supported(&ext) {
            return Err(unsupported_file_type(&ext));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        upload = Some((file_name, ext, bytes));
        break;
    }
    let (file_name, ext, bytes) =
        upload.ok_or_else(|| bad_request("multipart field `file` is required"))?;

    let chunks_processed = ingest_bytes(&app, &bytes, &file_name).await?;
    if chunks_processed == 0 {
        warn!(file = %file_name, "upload produced no indexed chunks");
        return Err(ingest_failed(
            "Failed to ingest document; chunks_processed=0",
        ));
    }

    let record = app.registry.register(&file_name, &ext, chunks_processed, None);
    Ok(Json(UploadResponse {
        message: "Document processed successfully and stored for future chats",
        document_id: record.document_id,
        chunks_processed,
    }))
}

#[derive(Deserialize)]
struct DirectUploadParams {
    file_path: String,
}

#[derive(Serialize)]
struct DirectUploadResponse {
    message: &'static str,
    file_name: String,
    chunks_processed: usize,
    document_id: String,
    available_documents_count: usize,
}

async fn handle_direct_upload(
    State(app): State<AppComponents>,
    params: Result<Query<DirectUploadParams>, QueryRejection>,
) -> Result<Json<DirectUploadResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let path = Path::new(&params.file_path);
    if !path.is_file() {
        return Err(not_found(format!("File not found: {}", params.file_path)));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| params.file_path.clone());
    let ext = file_extension(&file_name);
    if !is_supported(&ext) {
        return Err(unsupported_file_type(&ext));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| internal(format!("Failed to read {}: {}", params.file_path, e)))?;
    let chunks_processed = ingest_bytes(&app, &bytes, &file_name).await?;

    let record = app.registry.register(
        &file_name,
        &ext,
        chunks_processed,
        Some(params.file_path.clone()),
    );
    Ok(Json(DirectUploadResponse {
        message: "Document uploaded successfully and stored for future chats",
        file_name,
        chunks_processed,
        document_id: record.document_id,
        available_documents_count: app.registry.len(),
    }))
}

// ============ /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    total_documents: usize,
    documents: Vec<UploadedDocumentRecord>,
}

async fn handle_list_documents(State(app): State<AppComponents>) -> Json<DocumentListResponse> {
    let documents = app.registry.list();
    Json(DocumentListResponse {
        total_documents: documents.len(),
        documents,
    })
}

#[derive(Serialize)]
struct ClearResponse {
    message: &'static str,
    documents_removed: usize,
}

async fn handle_clear_documents(State(app): State<AppComponents>) -> Json<ClearResponse> {
    let documents_removed = app.registry.clear();
    info!(documents_removed, "document registry cleared");
    Json(ClearResponse {
        message: "All documents cleared successfully",
        documents_removed,
    })
}
