//! Chat-model backends.
//!
//! [`LlmService::generate`] never fails: any backend error becomes the
//! response text `Error generating response: <reason>`, which is what the
//! client sees in place of an answer.
//!
//! | `llm.provider` | Backend | Key |
//! |----------------|---------|-----|
//! | `groq` | [`GroqBackend`], OpenAI-compatible `chat/completions` | `GROQ_API_KEY` |
//! | `gemini` | [`GeminiBackend`], `models/{model}:generateContent` | `GOOGLE_API_KEY` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::{env_key, LlmConfig};
use crate::models::{recent_turns, ConversationTurn, ModelChoice};

/// Turns of history forwarded to the model.
pub const HISTORY_TURNS: usize = 10;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} environment variable not set")]
    MissingKey(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("unknown llm provider: {0}")]
    UnknownProvider(String),
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;
    /// `history` is already trimmed to the turns the model should see.
    async fn complete(
        &self,
        prompt: &str,
        model: ModelChoice,
        history: &[ConversationTurn],
    ) -> Result<String, LlmError>;
}

pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match config.provider.as_str() {
        "groq" => Ok(Arc::new(GroqBackend::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiBackend::new(config)?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value) -> Result<Value, LlmError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

// ============ Groq ============

pub struct GroqBackend {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GroqBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = env_key("GROQ_API_KEY").ok_or(LlmError::MissingKey("GROQ_API_KEY"))?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn groq_messages(prompt: &str, history: &[ConversationTurn]) -> Vec<Value> {
    history
        .iter()
        .map(|turn| json!({ "role": turn.role.api_name(), "content": turn.text }))
        .chain(std::iter::once(json!({ "role": "user", "content": prompt })))
        .collect()
}

fn parse_chat_completion(json: &Value) -> Result<String, LlmError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or(LlmError::EmptyResponse)
}

#[async_trait]
impl LlmBackend for GroqBackend {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(
        &self,
        prompt: &str,
        model: ModelChoice,
        history: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        let body = json!({
            "model": self.config.model_id(model),
            "messages": groq_messages(prompt, history),
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        let url = format!(
            "{}/chat/completions",
            self.config.groq_url.trim_end_matches('/')
        );
        let json = post_json(self.client.post(url).bearer_auth(&self.api_key), &body).await?;
        parse_chat_completion(&json)
    }
}

// ============ Gemini ============

/// Always uses `llm.gemini_model`; the client's model choice is ignored.
pub struct GeminiBackend {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = env_key("GOOGLE_API_KEY").ok_or(LlmError::MissingKey("GOOGLE_API_KEY"))?;
        Ok(Self {
            base_url: config.gemini_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

/// History is folded into the prompt text since the request is single-turn.
fn gemini_prompt(prompt: &str, history: &[ConversationTurn]) -> String {
    let context = history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Context:\n{}\n\nCurrent Question: {}", context, prompt)
}

fn parse_gemini_response(json: &Value) -> Result<String, LlmError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or(LlmError::EmptyResponse)?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        prompt: &str,
        _model: ModelChoice,
        history: &[ConversationTurn],
    ) -> Result<String, LlmError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": gemini_prompt(prompt, history) }] }]
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_json(request, &body).await?;
        parse_gemini_response(&json)
    }
}

// ============ Service ============

pub struct LlmService {
    backend: Arc<dyn LlmBackend>,
}

impl LlmService {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        model: ModelChoice,
        history: &[ConversationTurn],
    ) -> String {
        let history = recent_turns(history, HISTORY_TURNS);
        match self.backend.complete(prompt, model, history).await {
            Ok(text) => text,
            Err(e) => {
                warn!(backend = self.backend.name(), model = %model, error = %e, "LLM call failed");
                format!("Error generating response: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmBackend for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        async fn complete(
            &self,
            prompt: &str,
            _model: ModelChoice,
            history: &[ConversationTurn],
        ) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(history.len());
            if self.fail {
                return Err(LlmError::Api {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            Ok(format!("echo: {}", prompt))
        }
    }

    fn history(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(format!("q{}", i))
                } else {
                    ConversationTurn::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn generate_forwards_last_ten_turns() {
        let backend = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let service = LlmService::new(backend.clone());
        let out = service
            .generate("hi", ModelChoice::Llama3_70b, &history(14))
            .await;
        assert_eq!(out, "echo: hi");
        assert_eq!(*backend.seen.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn backend_failure_becomes_response_text() {
        let service = LlmService::new(Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: true,
        }));
        let out = service.generate("hi", ModelChoice::Gemma7b, &[]).await;
        assert_eq!(out, "Error generating response: API error 429: rate limited");
    }

    #[test]
    fn groq_messages_end_with_prompt() {
        let messages = groq_messages("What now?", &history(2));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "What now?");
    }

    #[test]
    fn gemini_prompt_folds_history() {
        let prompt = gemini_prompt("Why?", &history(2));
        assert_eq!(prompt, "Context:\nUser: q0\nAssistant: a1\n\nCurrent Question: Why?");
    }

    #[test]
    fn parse_responses() {
        let groq = json!({ "choices": [{ "message": { "content": "answer" } }] });
        assert_eq!(parse_chat_completion(&groq).unwrap(), "answer");
        assert!(matches!(
            parse_chat_completion(&json!({ "choices": [] })),
            Err(LlmError::EmptyResponse)
        ));

        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }] });
        assert_eq!(parse_gemini_response(&gemini).unwrap(), "ab");
        assert!(parse_gemini_response(&json!({})).is_err());
    }
}
