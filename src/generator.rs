//! Retrieval-augmented scraper generation.
//!
//! The query is answered by the LLM with the top stored snippets as context.
//! If the reply contains fenced code, only the first block is returned.

use anyhow::{bail, Result};
use tracing::info;

use crate::llm::{ChatClient, ChatMessage};
use crate::models::SimilarPage;
use crate::retrieval::Retriever;

const SYSTEM_PROMPT: &str = "You are an expert Python developer who writes web scrapers with the crawl4ai library \
(AsyncWebCrawler, BrowserConfig, CrawlerRunConfig). Use the documentation context to write complete, runnable \
crawl4ai code that fulfils the user's request. Reply with a single Python code block. \
If the context does not cover something, follow crawl4ai conventions rather than inventing APIs.";

pub async fn generate_scraper_code(
    retriever: &Retriever<'_>,
    chat: &dyn ChatClient,
    query: &str,
) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        bail!("query must not be empty");
    }

    let snippets = retriever.retrieve(query).await?;
    info!(query, snippets = snippets.len(), "Generating scraper code");

    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::system(context_block(&snippets)),
        ChatMessage::user(query),
    ];
    let reply = chat.complete(&messages, false).await?;

    Ok(first_code_block(&reply).unwrap_or_else(|| reply.trim().to_string()))
}

/// Snippets formatted for the prompt, each headed by its source URL.
pub fn context_block(snippets: &[SimilarPage]) -> String {
    if snippets.is_empty() {
        return "No documentation context was found for this request.".to_string();
    }

    let mut out = String::from("Documentation context:\n");
    for (i, hit) in snippets.iter().enumerate() {
        out.push_str(&format!("\n--- Snippet {} (source: {}) ---\n", i + 1, hit.page.url));
        if !hit.page.title.is_empty() {
            out.push_str(&format!("Title: {}\n", hit.page.title));
        }
        out.push_str(hit.page.content.trim());
        out.push('\n');
    }
    out
}

/// Body of the first ```-fenced block, without the language tag line.
pub fn first_code_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim_end().to_string())
}
