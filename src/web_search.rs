//! Internet search: general web results and academic papers.
//!
//! Web results come from the DuckDuckGo instant-answer API (abstract plus
//! related topics, flattened). Papers come from the arXiv query API, whose
//! Atom feed is parsed with quick-xml. Failures are returned as errors; the
//! orchestrator logs them and treats the source as having no results.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use serde_json::Value;

use crate::config::SearchConfig;
use crate::models::{PaperResult, WebResult};

#[async_trait]
pub trait InternetSearch: Send + Sync {
    async fn search_web(&self, query: &str, k: usize) -> Result<Vec<WebResult>>;
    async fn search_papers(&self, query: &str, k: usize) -> Result<Vec<PaperResult>>;
}

pub struct InternetSearchClient {
    client: reqwest::Client,
    duckduckgo_url: String,
    arxiv_url: String,
}

impl InternetSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("multimodal-rag/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            duckduckgo_url: config.duckduckgo_url.clone(),
            arxiv_url: config.arxiv_url.clone(),
        })
    }

    async fn get_text(&self, url: &str, params: &[(&str, String)], what: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{} search failed: {}", what, status);
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl InternetSearch for InternetSearchClient {
    async fn search_web(&self, query: &str, k: usize) -> Result<Vec<WebResult>> {
        let params = [
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("no_redirect", "1".to_string()),
            ("no_html", "1".to_string()),
        ];
        let body = self
            .get_text(&self.duckduckgo_url, &params, "DuckDuckGo")
            .await?;
        let payload: Value =
            serde_json::from_str(&body).context("DuckDuckGo returned invalid JSON")?;
        let mut results = parse_duckduckgo(&payload);
        results.truncate(k);
        Ok(results)
    }

    async fn search_papers(&self, query: &str, k: usize) -> Result<Vec<PaperResult>> {
        let params = [
            ("search_query", format!("all:{}", query)),
            ("start", "0".to_string()),
            ("max_results", k.to_string()),
            ("sortBy", "relevance".to_string()),
        ];
        let body = self.get_text(&self.arxiv_url, &params, "arXiv").await?;
        let mut papers = parse_arxiv_feed(&body)?;
        papers.truncate(k);
        Ok(papers)
    }
}

/// Abstract first, then `Results`, then `RelatedTopics` (nested topic
/// groups flattened).
fn parse_duckduckgo(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = payload
        .get("AbstractText")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let abstract_url = payload
        .get("AbstractURL")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = payload
            .get("Heading")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text));
        results.push(WebResult {
            title: heading.to_string(),
            link: abstract_url.to_string(),
            description: abstract_text.to_string(),
        });
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = payload.get(key).and_then(|v| v.as_array()) {
            collect_topics(items, &mut results);
        }
    }
    results
}

fn collect_topics(items: &[Value], results: &mut Vec<WebResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            collect_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            link: url.to_string(),
            description: text.to_string(),
        });
    }
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryBuilder {
    fn finish(self) -> PaperResult {
        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| self.id.trim().replacen("/abs/", "/pdf/", 1));
        PaperResult {
            title: collapse_whitespace(&self.title),
            authors: self.authors,
            summary: collapse_whitespace(&self.summary),
            pdf_url,
            published: self.published.trim().chars().take(10).collect(),
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses an arXiv Atom feed into papers, in feed order.
fn parse_arxiv_feed(xml: &str) -> Result<Vec<PaperResult>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"entry" {
                    entry = Some(EntryBuilder::default());
                } else if entry.is_some() {
                    if name == b"author" {
                        if let Some(current) = entry.as_mut() {
                            current.authors.push(String::new());
                        }
                    }
                    field = Some(name);
                }
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"link" => {
                let Some(current) = entry.as_mut() else {
                    continue;
                };
                let mut is_pdf = false;
                let mut href = None;
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.local_name().as_ref() {
                        b"title" if value == "pdf" => is_pdf = true,
                        b"type" if value == "application/pdf" => is_pdf = true,
                        b"href" => href = Some(value),
                        _ => {}
                    }
                }
                if is_pdf && current.pdf_url.is_none() {
                    current.pdf_url = href;
                }
            }
            Ok(Event::Text(t)) => {
                let (Some(current), Some(name)) = (entry.as_mut(), field.as_deref()) else {
                    continue;
                };
                let text = t.unescape()?;
                match name {
                    b"id" => current.id.push_str(&text),
                    b"title" => current.title.push_str(&text),
                    b"summary" => current.summary.push_str(&text),
                    b"published" => current.published.push_str(&text),
                    b"name" => {
                        if let Some(author) = current.authors.last_mut() {
                            author.push_str(text.trim());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        papers.push(done.finish());
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("invalid arXiv feed: {}", e),
            _ => {}
        }
    }
    Ok(papers)
}
