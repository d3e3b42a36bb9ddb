//! Context and prompt text handed to the language model.
//!
//! Layout of a composed prompt:
//!
//! ```text
//! Context:
//! Retrieved Documents (2):
//! Document 1 (Source: a.pdf):
//! <chunk text>
//!
//! Document 2 (Source: b.md):
//! <chunk text>
//!
//! Internet Results:
//! [Web 1] <title> (Source: <link>)
//! <description>
//!
//!
//! Conversation History:
//! User: ...
//! Assistant: ...
//!
//! User Question: <query>
//!
//! <style instruction>
//! ```

use crate::models::{recent_turns, Chunk, ConversationTurn, InternetResult};

/// Turns of history rendered into the prompt.
pub const PROMPT_HISTORY_TURNS: usize = 5;

const NO_DOCUMENTS: &str = "No documents retrieved from the vector store.\n";
const NO_HISTORY: &str = "(no prior messages)";

/// Answer style requested in the closing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Comprehensive,
    KgReasoning,
    Synthesise,
}

impl PromptStyle {
    pub fn instruction(&self) -> &'static str {
        match self {
            PromptStyle::Comprehensive => {
                "Please provide a comprehensive answer citing given sources only. \
                 If the query is unrelated to the context, politely indicate that you \
                 don't have the information."
            }
            PromptStyle::KgReasoning => {
                "Using knowledge graph reasoning, analyze relationships and provide an \
                 insightful answer citing sources. If the query is unrelated to the context, \
                 politely indicate that you don't have the information."
            }
            PromptStyle::Synthesise => {
                "Synthesize information from all available sources and highlight key \
                 insights with citations. If the query is unrelated to the context, \
                 politely indicate that you don't have the information."
            }
        }
    }
}

fn internet_lines(results: &[InternetResult]) -> Vec<String> {
    if results.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Internet Results:".to_string()];
    for (i, r) in results.iter().enumerate() {
        lines.push(format!(
            "[Web {}] {} (Source: {})\n{}\n",
            i + 1,
            r.title(),
            r.link(),
            r.description()
        ));
    }
    lines
}

/// Documents section followed by the internet section, lines joined by `\n`.
pub fn build_context(documents: &[Chunk], internet: &[InternetResult]) -> String {
    let mut lines = Vec::new();
    if documents.is_empty() {
        lines.push(NO_DOCUMENTS.to_string());
    } else {
        lines.push(format!("Retrieved Documents ({}):", documents.len()));
        for (i, doc) in documents.iter().enumerate() {
            lines.push(format!(
                "Document {} (Source: {}):\n{}\n",
                i + 1,
                doc.source,
                doc.content
            ));
        }
    }
    lines.extend(internet_lines(internet));
    lines.join("\n")
}

/// The internet section alone; empty when there are no results.
pub fn format_internet_results(results: &[InternetResult]) -> String {
    internet_lines(results).join("\n")
}

pub fn build_graph_context(documents: &[Chunk], entities: &[String]) -> String {
    let mut ctx = String::from("Knowledge Graph Context:\n");
    if !entities.is_empty() {
        ctx.push_str(&format!("Key Entities: {}\n\n", entities.join(", ")));
    }
    ctx.push_str("Relevant Documents:\n");
    for (i, doc) in documents.iter().enumerate() {
        ctx.push_str(&format!(
            "Document {} (Source: {}):\n{}\n\n",
            i + 1,
            doc.source,
            doc.content
        ));
    }
    ctx
}

pub fn format_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }
    recent_turns(history, PROMPT_HISTORY_TURNS)
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn compose_prompt(
    context: &str,
    history: &[ConversationTurn],
    query: &str,
    style: PromptStyle,
) -> String {
    format!(
        "Context:\n{}\n\nConversation History:\n{}\n\nUser Question: {}\n\n{}",
        context,
        format_history(history),
        query,
        style.instruction()
    )
}
