//! Source synchronisation: crawl content and write it to the store.
//!
//! Two fixed sources feed the retrieval corpus:
//!
//! | Source | Module | What it stores |
//! |--------|--------|----------------|
//! | `docs` | [`docs`] | Sitemap pages, chunked, titled, and embedded |
//! | `github` | [`github`] | Text files from a repository via the REST contents API |
//!
//! [`sync_url`] syncs one arbitrary URL instead: GitHub repositories go
//! through the MCP bridge when a `github` MCP server is configured, anything
//! else through [`website`].

pub mod docs;
pub mod github;
pub mod website;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::analyzer::WebsiteAnalyzer;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::llm::{create_chat, title_and_summary, ChatClient};
use crate::mcp::{GithubMcpScraper, McpClient};
use crate::models::NewPage;
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::store::{open_store, Store};
use crate::strategy::is_github_url;
use crate::validate::validate_url;

pub use docs::DocsCrawler;
pub use github::GithubCrawler;

/// Name of the `[mcp.servers.*]` entry used for GitHub URLs.
pub const GITHUB_MCP_SERVER: &str = "github";

/// Everything a source needs to write pages.
pub struct SyncContext<'a> {
    pub store: &'a dyn Store,
    pub embedder: &'a dyn EmbeddingProvider,
    pub chat: &'a dyn ChatClient,
    pub progress: &'a dyn SyncProgressReporter,
    pub chunk_size: usize,
    pub max_age_days: i64,
}

impl SyncContext<'_> {
    /// Whether `url` should be (re)crawled. Store errors count as due.
    pub async fn is_due(&self, url: &str, force: bool) -> bool {
        if force {
            return true;
        }
        match self.store.should_update(url, self.max_age_days).await {
            Ok(due) => due,
            Err(e) => {
                warn!(url, error = %e, "Freshness check failed, recrawling");
                true
            }
        }
    }

    /// Embed `texts`, or return empty vectors when embeddings are disabled
    /// or the provider fails. Empty vectors are stored as "not embedded".
    pub async fn embed_or_empty(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if self.embedder.dims() == 0 {
            return vec![Vec::new(); texts.len()];
        }
        match self.embedder.embed_texts(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors,
            Ok(vectors) => {
                error!(
                    expected = texts.len(),
                    got = vectors.len(),
                    "Embedding count mismatch, storing without embeddings"
                );
                vec![Vec::new(); texts.len()]
            }
            Err(e) => {
                error!(error = %e, "Error generating embeddings, storing without embeddings");
                vec![Vec::new(); texts.len()]
            }
        }
    }

    /// Chunk `markdown`, title and embed each chunk, and store it under `url`.
    ///
    /// `extra` is merged into every chunk's metadata after the chunk fields.
    /// Chunks left over from a longer previous version are deleted. Returns
    /// the number of chunks stored.
    pub async fn store_chunks(
        &self,
        url: &str,
        markdown: &str,
        source: &str,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<usize> {
        let chunks = chunk_text(markdown, self.chunk_size);
        let total = chunks.len();
        let embeddings = self.embed_or_empty(&chunks).await;

        for (i, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            let ts = title_and_summary(self.chat, chunk, url).await;
            let title = if ts.title.is_empty() {
                format!("Chunk {} of {}", i + 1, url)
            } else {
                ts.title
            };
            let summary = if ts.summary.is_empty() {
                "No summary available".to_string()
            } else {
                ts.summary
            };

            let mut metadata = serde_json::json!({
                "source": source,
                "chunk_size": chunk.chars().count(),
                "chunk_index": i,
                "total_chunks": total,
            });
            if let Some(map) = metadata.as_object_mut() {
                for (k, v) in extra {
                    map.insert(k.clone(), v.clone());
                }
            }

            self.store
                .save_page(NewPage {
                    url: url.to_string(),
                    chunk_number: i as i64,
                    title,
                    summary,
                    content: chunk.clone(),
                    metadata,
                    embedding,
                })
                .await?;
            debug!(url, chunk = i + 1, total, "Stored chunk");
        }

        let mut stale = total as i64;
        while self.store.delete_page(url, Some(stale)).await? > 0 {
            stale += 1;
        }

        Ok(total)
    }
}

/// Per-source counts from [`sync_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub github: usize,
    pub docs: usize,
    pub total: usize,
}

/// Sync the GitHub repository and the documentation site concurrently.
///
/// A failing source is logged and counted as zero so the other still runs.
pub async fn sync_all(
    config: &Config,
    ctx: &SyncContext<'_>,
    force: bool,
    max_concurrent: usize,
) -> Result<SyncCounts> {
    let crawler = Crawler::new(&config.crawl)?;
    let docs = DocsCrawler::new(ctx, &crawler, &config.sources.docs_url);
    let github = GithubCrawler::new(ctx, &config.sources, config.crawl.request_timeout_secs)?;

    let (github_result, docs_result) = tokio::join!(github.sync(force), docs.sync(force, max_concurrent));

    let github = github_result.unwrap_or_else(|e| {
        error!(error = %e, "GitHub sync failed");
        0
    });
    let docs = docs_result.unwrap_or_else(|e| {
        error!(error = %e, "Documentation sync failed");
        0
    });

    let counts = SyncCounts {
        github,
        docs,
        total: github + docs,
    };
    info!(github, docs, total = counts.total, "Sync finished");
    Ok(counts)
}

/// Sync a single URL. Returns the number of items stored.
pub async fn sync_url(
    config: &Config,
    ctx: &SyncContext<'_>,
    url: &str,
    force: bool,
    max_concurrent: usize,
) -> Result<usize> {
    if !validate_url(url) {
        bail!("Invalid URL: {}", url);
    }

    if is_github_url(url) {
        if let Some(server) = config.mcp.servers.get(GITHUB_MCP_SERVER) {
            let client = McpClient::new(server.clone(), &config.mcp);
            let scraper = GithubMcpScraper::new(client, ctx, config.sources.github_max_depth);
            return scraper.scrape_repository(url, force).await;
        }
        info!(url, "No github MCP server configured, syncing as a website");
    }

    let analyzer = WebsiteAnalyzer::new(&config.crawl)?;
    website::sync_website(ctx, &analyzer, url, config.crawl.max_urls, max_concurrent, force).await
}

/// `crawlrag sync`: sync both sources (or one URL) and print the counts.
pub async fn run_sync(
    config: &Config,
    url: Option<&str>,
    force: bool,
    max_concurrent: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let max_concurrent = max_concurrent.unwrap_or(config.crawl.max_concurrent).max(1);

    let store = open_store(config).await?;
    let embedder = create_provider(&config.embedding)?;
    let chat = create_chat(&config.llm)?;
    let reporter = progress.reporter();
    let ctx = SyncContext {
        store: store.as_ref(),
        embedder: embedder.as_ref(),
        chat: chat.as_ref(),
        progress: reporter.as_ref(),
        chunk_size: config.crawl.chunk_size,
        max_age_days: config.store.max_age_days,
    };

    match url {
        Some(url) => {
            println!("Syncing {}...", url);
            let stored = sync_url(config, &ctx, url, force, max_concurrent).await?;
            ctx.progress.report(SyncProgressEvent::Done {
                source: "url".into(),
                stored: stored as u64,
            });
            println!("Sync completed successfully!");
            println!("Stored {} items from {}", stored, url);
        }
        None => {
            println!(
                "Syncing {} and {}...",
                config.sources.github_repo, config.sources.docs_url
            );
            let counts = sync_all(config, &ctx, force, max_concurrent).await?;
            println!("Sync completed successfully!");
            println!("Processed {} GitHub files", counts.github);
            println!("Processed {} documentation chunks", counts.docs);
            println!("Total: {} items", counts.total);
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::config::SourcesConfig;
    use crate::llm::TITLE_FALLBACK;
    use crate::mcp::github::test_support::fake_github_server;
    use base64::Engine;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(github: &MockServer, docs: &MockServer) -> Config {
        let mut config = Config::default();
        config.sources = SourcesConfig {
            github_repo: "o/r".into(),
            github_api_url: github.uri(),
            docs_url: docs.uri(),
            ..SourcesConfig::default()
        };
        config.crawl.request_timeout_secs = 5;
        config
    }

    async fn mount_repo(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "a.py", "path": "a.py", "type": "file"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/a.py"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "file",
                "encoding": "base64",
                "content": base64::engine::general_purpose::STANDARD.encode("print('a')"),
                "sha": "s1",
                "size": 10,
                "path": "a.py",
                "html_url": "https://github.com/o/r/blob/main/a.py",
            })))
            .mount(server)
            .await;
    }

    async fn mount_docs(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{}/intro</loc></url></urlset>",
                server.uri()
            )))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/intro"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>Intro</h1><p>Getting started.</p></body></html>",
                "text/html",
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_sync_all_counts_failed_docs_as_zero() {
        let github = MockServer::start().await;
        mount_repo(&github).await;
        let docs = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&docs)
            .await;

        let fx = Fixture::new();
        let counts = sync_all(&config_for(&github, &docs), &fx.ctx(5000), false, 2)
            .await
            .unwrap();
        assert_eq!(
            counts,
            SyncCounts {
                github: 1,
                docs: 0,
                total: 1
            }
        );
        let page = fx
            .store
            .get_page("https://github.com/o/r/blob/main/a.py", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.metadata["source"], "github");
    }

    #[tokio::test]
    async fn test_sync_all_counts_failed_github_as_zero() {
        let github = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&github)
            .await;
        let docs = MockServer::start().await;
        mount_docs(&docs).await;

        let fx = Fixture::new();
        let counts = sync_all(&config_for(&github, &docs), &fx.ctx(5000), false, 2)
            .await
            .unwrap();
        assert_eq!(counts.github, 0);
        assert_eq!(counts.docs, 1);
        assert_eq!(counts.total, 1);
    }

    #[tokio::test]
    async fn test_sync_url_routes_github_to_mcp_server() {
        let mut config = Config::default();
        config.mcp.timeout_secs = 5;
        config
            .mcp
            .servers
            .insert(GITHUB_MCP_SERVER.to_string(), fake_github_server());

        let fx = Fixture::new();
        let stored = sync_url(&config, &fx.ctx(1000), "https://github.com/acme/widgets", false, 2)
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let readme = fx
            .store
            .get_page("https://github.com/acme/widgets/blob/main/README.md", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(readme.metadata["source"], "mcp");
        assert_eq!(
            fx.store.source_counts().await.unwrap(),
            vec![("mcp".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_sync_url_rejects_invalid_url() {
        let fx = Fixture::new();
        let err = sync_url(&Config::default(), &fx.ctx(1000), "not a url", false, 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[tokio::test]
    async fn test_store_chunks_metadata_and_stale_cleanup() {
        let fx = Fixture::new();
        let ctx = fx.ctx(20);
        let long = "First part here.\n\nSecond part here.\n\nThird part here.";
        let mut extra = serde_json::Map::new();
        extra.insert("origin".into(), serde_json::json!("test"));

        let n = ctx
            .store_chunks("https://d.test/p", long, "docs", &extra)
            .await
            .unwrap();
        assert_eq!(n, 3);

        let first = fx.store.get_page("https://d.test/p", 0).await.unwrap().unwrap();
        assert_eq!(first.title, TITLE_FALLBACK);
        assert_eq!(first.metadata["source"], "docs");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert_eq!(first.metadata["total_chunks"], 3);
        assert_eq!(first.metadata["origin"], "test");
        assert_eq!(first.metadata["url_path"], "/p");
        assert_eq!(first.embedding, vec![1.0, 0.0]);

        let n = ctx
            .store_chunks("https://d.test/p", "Short now.", "docs", &extra)
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(fx.store.page_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_is_due_respects_force_and_age() {
        let fx = Fixture::new();
        let ctx = fx.ctx(100);
        assert!(ctx.is_due("https://d.test/", false).await);
        ctx.store_chunks("https://d.test/", "x", "docs", &serde_json::Map::new())
            .await
            .unwrap();
        assert!(!ctx.is_due("https://d.test/", false).await);
        assert!(ctx.is_due("https://d.test/", true).await);
    }

    #[tokio::test]
    async fn test_disabled_embedder_stores_unembedded() {
        let fx = Fixture::new();
        let ctx = SyncContext {
            embedder: &crate::embedding::DisabledProvider,
            ..fx.ctx(100)
        };
        ctx.store_chunks("https://d.test/", "text", "docs", &serde_json::Map::new())
            .await
            .unwrap();
        let page = fx.store.get_page("https://d.test/", 0).await.unwrap().unwrap();
        assert!(page.embedding.is_empty());
    }
}
