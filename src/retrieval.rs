//! Query-time retrieval: embed the query, then vector-search the store.

use anyhow::{bail, Result};
use tracing::debug;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::models::SimilarPage;
use crate::store::{open_store, Store};

pub struct Retriever<'a> {
    store: &'a dyn Store,
    embedder: &'a dyn EmbeddingProvider,
    match_count: usize,
    threshold: f64,
    filter: serde_json::Value,
}

impl<'a> Retriever<'a> {
    pub fn new(
        store: &'a dyn Store,
        embedder: &'a dyn EmbeddingProvider,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            match_count: config.match_count,
            threshold: config.threshold,
            filter: serde_json::json!({}),
        }
    }

    /// Only return pages whose metadata contains every key in `filter`.
    pub fn with_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_match_count(mut self, match_count: usize) -> Self {
        self.match_count = match_count;
        self
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<SimilarPage>> {
        let query = query.trim();
        if query.is_empty() {
            bail!("query must not be empty");
        }

        let vector = self.embedder.embed_query(query).await?;
        let hits = self
            .store
            .search_similar(&vector, self.match_count, self.threshold, &self.filter)
            .await?;
        debug!(query, hits = hits.len(), "Retrieved snippets");
        Ok(hits)
    }
}

/// `crawlrag search`: print ranked snippets for `query`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let store = open_store(config).await?;
    let embedder = create_provider(&config.embedding)?;
    let mut retriever = Retriever::new(store.as_ref(), embedder.as_ref(), &config.retrieval);
    if let Some(n) = limit {
        retriever = retriever.with_match_count(n);
    }

    let hits = retriever.retrieve(query).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.similarity,
            hit.page.url,
            hit.page.chunk_number
        );
        if !hit.page.title.is_empty() {
            println!("    title: {}", hit.page.title);
        }
        println!("    {}", snippet(&hit.page.content, 200));
        println!();
    }

    Ok(())
}

fn snippet(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
