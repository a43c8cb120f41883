//! Documentation site sync driven by `sitemap.xml`.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};

use super::SyncContext;
use crate::crawler::Crawler;
use crate::progress::SyncProgressEvent;

const SOURCE: &str = "docs";

pub struct DocsCrawler<'a> {
    ctx: &'a SyncContext<'a>,
    crawler: &'a Crawler,
    base_url: String,
}

impl<'a> DocsCrawler<'a> {
    pub fn new(ctx: &'a SyncContext<'a>, crawler: &'a Crawler, base_url: &str) -> Self {
        Self {
            ctx,
            crawler,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Crawl every sitemap URL and return the number of chunks stored.
    pub async fn sync(&self, force: bool, max_concurrent: usize) -> Result<usize> {
        info!(base_url = %self.base_url, "Starting documentation crawl");
        self.ctx.progress.report(SyncProgressEvent::Discovering {
            source: SOURCE.into(),
        });

        let urls = self.crawler.fetch_sitemap(&self.base_url).await?;
        if urls.is_empty() {
            warn!(base_url = %self.base_url, "No URLs found in sitemap");
            return Ok(0);
        }
        info!(count = urls.len(), "Found URLs in sitemap");

        let stored = self.crawl_parallel(&urls, force, max_concurrent).await;
        self.ctx.progress.report(SyncProgressEvent::Done {
            source: SOURCE.into(),
            stored: stored as u64,
        });
        Ok(stored)
    }

    /// Fetch and store `urls` with at most `max_concurrent` in flight. URLs
    /// crawled within `max_age_days` are skipped unless `force`.
    pub async fn crawl_parallel(&self, urls: &[String], force: bool, max_concurrent: usize) -> usize {
        let total = urls.len() as u64;
        let done = AtomicU64::new(0);

        let counts: Vec<usize> = stream::iter(urls)
            .map(|url| {
                let done = &done;
                async move {
                    let stored = self.process_url(url, force).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.ctx.progress.report(SyncProgressEvent::Processing {
                        source: SOURCE.into(),
                        n,
                        total,
                    });
                    stored
                }
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        let stored: usize = counts.iter().sum();
        info!(chunks = stored, urls = urls.len(), "Processed documentation URLs");
        stored
    }

    async fn process_url(&self, url: &str, force: bool) -> usize {
        if !self.ctx.is_due(url, force).await {
            info!(url, "Skipping, recently crawled");
            return 0;
        }

        let page = match self.crawler.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                error!(url, error = %e, "Failed to crawl");
                return 0;
            }
        };
        if page.markdown.is_empty() {
            warn!(url, "Page has no content");
            return 0;
        }

        let mut extra = serde_json::Map::new();
        if !page.title.is_empty() {
            extra.insert("page_title".into(), serde_json::Value::String(page.title));
        }
        match self.ctx.store_chunks(url, &page.markdown, SOURCE, &extra).await {
            Ok(n) => {
                info!(url, chunks = n, "Stored document");
                n
            }
            Err(e) => {
                error!(url, error = %e, "Error processing document");
                0
            }
        }
    }
}
