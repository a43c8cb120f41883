//! Generic website sync: the root page plus its internal links.

use anyhow::Result;
use tracing::{error, info};

use super::SyncContext;
use crate::analyzer::WebsiteAnalyzer;
use crate::progress::SyncProgressEvent;

const SOURCE: &str = "website";

/// Analyze `url` and up to `max_urls - 1` linked pages, then chunk and store
/// each one that is due. Returns the number of chunks stored.
pub async fn sync_website(
    ctx: &SyncContext<'_>,
    analyzer: &WebsiteAnalyzer,
    url: &str,
    max_urls: usize,
    max_concurrent: usize,
    force: bool,
) -> Result<usize> {
    ctx.progress.report(SyncProgressEvent::Discovering {
        source: SOURCE.into(),
    });
    let site = analyzer.analyze_website(url, max_urls, max_concurrent).await?;
    let total = site.pages.len() as u64;

    let mut stored = 0;
    for (i, page) in site.pages.iter().enumerate() {
        if ctx.is_due(&page.url, force).await && !page.markdown.is_empty() {
            let mut extra = serde_json::Map::new();
            extra.insert("root_url".into(), serde_json::Value::String(site.root_url.clone()));
            if !page.title.is_empty() {
                extra.insert("page_title".into(), serde_json::Value::String(page.title.clone()));
            }
            match ctx.store_chunks(&page.url, &page.markdown, SOURCE, &extra).await {
                Ok(n) => stored += n,
                Err(e) => error!(url = %page.url, error = %e, "Error storing page"),
            }
        }
        ctx.progress.report(SyncProgressEvent::Processing {
            source: SOURCE.into(),
            n: i as u64 + 1,
            total,
        });
    }

    info!(url, pages = total, chunks = stored, "Website sync finished");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::config::CrawlConfig;
    use crate::store::Store;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sync_website_stores_root_and_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>Home</h1><p><a href=\"/about\">About</a></p></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>About</h1><p>We crawl.</p></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let fx = Fixture::new();
        let ctx = fx.ctx(5000);
        let analyzer = WebsiteAnalyzer::new(&CrawlConfig::default()).unwrap();
        let root = format!("{}/", server.uri());

        let stored = sync_website(&ctx, &analyzer, &root, 5, 2, false).await.unwrap();
        assert_eq!(stored, 2);
        let about = fx
            .store
            .get_page(&format!("{}/about", server.uri()), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(about.metadata["source"], "website");
        assert_eq!(about.metadata["root_url"], root.as_str());

        assert_eq!(sync_website(&ctx, &analyzer, &root, 5, 2, false).await.unwrap(), 0);
    }
}
