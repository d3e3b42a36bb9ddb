//! End-to-end tests for the HTTP API.
//!
//! Each test starts the real axum server on a free port with an in-memory
//! vector index and fake collaborators (bag-of-words embedder, echoing
//! chat model, canned search results, fixed OCR output), then drives it
//! with reqwest.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use multimodal_rag::app::{AppComponents, Collaborators};
use multimodal_rag::config::Config;
use multimodal_rag::embedding::EmbeddingProvider;
use multimodal_rag::llm::{LlmBackend, LlmError};
use multimodal_rag::models::{ConversationTurn, ModelChoice, PaperResult, WebResult};
use multimodal_rag::ocr::OcrEngine;
use multimodal_rag::server::run_server_with;
use multimodal_rag::vector_store::InMemoryIndex;
use multimodal_rag::web_search::InternetSearch;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Hashes lowercase words into a fixed number of buckets.
struct BagOfWords;

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        256
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; 256];
                for word in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let h = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
                    v[h % 256] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Answers with the prompt it received, so tests can inspect the context.
struct EchoLlm {
    fail: bool,
}

#[async_trait]
impl LlmBackend for EchoLlm {
    fn name(&self) -> &str {
        "echo"
    }
    async fn complete(
        &self,
        prompt: &str,
        _model: ModelChoice,
        _history: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        if self.fail {
            return Err(LlmError::Api {
                status: 503,
                body: "model overloaded".to_string(),
            });
        }
        Ok(prompt.to_string())
    }
}

struct CannedSearch;

#[async_trait]
impl InternetSearch for CannedSearch {
    async fn search_web(&self, query: &str, k: usize) -> Result<Vec<WebResult>> {
        Ok((1..=k)
            .map(|i| WebResult {
                title: format!("{} #{}", query, i),
                link: format!("https://example.org/{}", i),
                description: "From the web.".to_string(),
            })
            .collect())
    }

    async fn search_papers(&self, _query: &str, _k: usize) -> Result<Vec<PaperResult>> {
        bail!("arXiv unavailable")
    }
}

struct FixedOcr;

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _image: &[u8], _extension: &str) -> Result<String> {
        Ok("INVOICE 2024-117 Total due: 420 EUR".to_string())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Starts a server and returns its base URL.
async fn start_server(llm_fails: bool) -> String {
    let port = find_free_port();
    let mut cfg = Config::default();
    cfg.server.bind = format!("127.0.0.1:{}", port);

    let components = AppComponents::new(
        &cfg,
        Collaborators {
            embedder: Arc::new(BagOfWords),
            index: Arc::new(InMemoryIndex::new()),
            ocr: Arc::new(FixedOcr),
            search: Arc::new(CannedSearch),
            llm: Arc::new(EchoLlm { fail: llm_fails }),
        },
    );
    tokio::spawn(async move {
        run_server_with(&cfg, components).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn upload(client: &reqwest::Client, base: &str, name: &str, bytes: Vec<u8>) -> reqwest::Response {
    let form = Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()));
    client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn document_count(client: &reqwest::Client, base: &str) -> u64 {
    let body: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["total_documents"].as_u64().unwrap()
}

const NOTES: &str = "Yellowstone National Park is home to Old Faithful, a geyser that \
erupts roughly every ninety minutes. The park spans Wyoming, Montana and Idaho.";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_root() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["documents_available"], 0);
    assert!(health["version"].is_string());

    let root: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["available_rag_variants"], json!(["vanilla", "knowledge_graph", "hybrid"]));
    assert!(root["supported_file_types"]
        .as_array()
        .unwrap()
        .contains(&json!("docx")));
    assert!(root["endpoints"]["POST /upload"].is_string());
}

#[tokio::test]
async fn test_upload_chat_and_clear() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "parks.txt", NOTES.as_bytes().to_vec()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["chunks_processed"], 1);
    assert!(!body["document_id"].as_str().unwrap().is_empty());

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(docs["total_documents"], 1);
    assert_eq!(docs["documents"][0]["file_name"], "parks.txt");
    assert_eq!(docs["documents"][0]["file_type"], "txt");

    let chat: Value = client
        .post(format!("{}/chat", base))
        .json(&json!({
            "message": "When does Old Faithful erupt?",
            "conversation_history": [
                { "message": "Tell me about Yellowstone", "is_user": true, "timestamp": "" },
                { "message": "It is a national park.", "is_user": false, "timestamp": "" }
            ],
            "llm_choice": "llama3-70b",
            "rag_variant": "vanilla",
            "use_internet_search": false
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["sources"], json!(["parks.txt"]));
    let response = chat["response"].as_str().unwrap();
    assert!(response.contains("Document 1 (Source: parks.txt)"));
    assert!(response.contains("User: Tell me about Yellowstone\nAssistant: It is a national park."));
    assert!(chat["processing_time"].as_f64().unwrap() >= 0.0);

    let cleared: Value = client
        .delete(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["documents_removed"], 1);
    assert_eq!(document_count(&client, &base).await, 0);

    // Clearing the registry leaves indexed chunks retrievable.
    let chat: Value = client
        .post(format!("{}/direct-chat?message=Old%20Faithful", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["sources"], json!(["parks.txt"]));
    assert_eq!(chat["available_documents"], 0);
}

#[tokio::test]
async fn test_unsupported_upload_is_rejected_without_side_effects() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "payload.xyz", b"binary".to_vec()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_file_type");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported file type: xyz"));

    assert_eq!(document_count(&client, &base).await, 0);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let form = Form::new().text("comment", "no file here");
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_image_upload_uses_ocr() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "invoice.PNG", vec![0x89, b'P', b'N', b'G']).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["chunks_processed"], 1);

    let chat: Value = client
        .post(format!("{}/direct-chat?message=invoice%20total&rag=hybrid", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["rag_used"], "hybrid");
    assert!(chat["response"]
        .as_str()
        .unwrap()
        .contains("INVOICE 2024-117"));
}

#[tokio::test]
async fn test_direct_upload() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();
    let tmp = TempDir::new().unwrap();

    let missing = tmp.path().join("missing.txt");
    let resp = client
        .post(format!("{}/direct-upload", base))
        .query(&[("file_path", missing.to_string_lossy().to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let odd = tmp.path().join("data.xyz");
    std::fs::write(&odd, "whatever").unwrap();
    let resp = client
        .post(format!("{}/direct-upload", base))
        .query(&[("file_path", odd.to_string_lossy().to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let notes = tmp.path().join("notes.md");
    std::fs::write(&notes, NOTES).unwrap();
    let resp = client
        .post(format!("{}/direct-upload", base))
        .query(&[("file_path", notes.to_string_lossy().to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["file_name"], "notes.md");
    assert_eq!(body["chunks_processed"], 1);
    assert_eq!(body["available_documents_count"], 1);

    let docs: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        docs["documents"][0]["original_path"],
        notes.to_string_lossy().to_string()
    );
}

#[tokio::test]
async fn test_direct_chat_defaults_and_validation() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let chat: Value = client
        .post(format!("{}/direct-chat?message=hello", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["llm_used"], "llama2-70b");
    assert_eq!(chat["rag_used"], "vanilla");
    assert_eq!(chat["internet_search"], false);
    assert_eq!(chat["sources"], json!([]));
    assert!(chat["response"]
        .as_str()
        .unwrap()
        .contains("No documents retrieved from the vector store."));

    let resp = client
        .post(format!("{}/direct-chat?message=hello&rag=graph", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/direct-chat", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_chat_validation() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/chat", base))
        .json(&json!({
            "message": "   ",
            "conversation_history": [],
            "llm_choice": "gemma-7b",
            "rag_variant": "vanilla"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/chat", base))
        .json(&json!({
            "message": "hi",
            "conversation_history": [],
            "llm_choice": "gpt-5",
            "rag_variant": "vanilla"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_internet_results_and_failing_arxiv() {
    let base = start_server(false).await;
    let client = reqwest::Client::new();
    upload(&client, &base, "parks.txt", NOTES.as_bytes().to_vec()).await;

    let chat: Value = client
        .post(format!(
            "{}/direct-chat?message=geysers&rag=hybrid&use_internet=true&llm=gemma-7b",
            base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let response = chat["response"].as_str().unwrap();
    assert!(response.contains("Internet Results:"));
    assert!(response.contains("[Web 3] geysers #3 (Source: https://example.org/3)"));
    assert!(!response.contains("[Web 4]"));
    assert_eq!(chat["internet_search"], true);
    assert_eq!(chat["llm_used"], "gemma-7b");
}

#[tokio::test]
async fn test_llm_failure_is_reported_in_response() {
    let base = start_server(true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/chat", base))
        .json(&json!({
            "message": "anything",
            "conversation_history": [],
            "llm_choice": "llama2-70b",
            "rag_variant": "knowledge_graph",
            "use_internet_search": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let chat: Value = resp.json().await.unwrap();
    assert_eq!(
        chat["response"],
        "Error generating response: API error 503: model overloaded"
    );
}
