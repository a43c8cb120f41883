//! Website analysis: page structure, site link maps, and type detection.
//!
//! A [`WebsiteAnalyzer`] wraps a [`Crawler`] and turns fetched pages into
//! [`PageAnalysis`] values. [`WebsiteAnalyzer::analyze_website`] analyzes a
//! root URL plus a bounded number of its internal links, and
//! [`WebsiteAnalyzer::detect_website_type`] classifies a site by URL and
//! content keywords.

use anyhow::{bail, Result};
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::{Config, CrawlConfig};
use crate::crawler::Crawler;
use crate::models::{
    Heading, PageAnalysis, SiteAnalysis, SiteStructure, StructureStats, WebsiteType,
};
use crate::validate::{validate_url, validate_urls};

const WORDS_PER_MINUTE: f64 = 200.0;

const ECOMMERCE_URL_PATTERNS: &[&str] = &[
    "/shop",
    "/store",
    "/product",
    "/cart",
    "/checkout",
    "amazon",
    "ebay",
    "etsy",
    "shopify",
    "woocommerce",
];
const DOCUMENTATION_URL_PATTERNS: &[&str] = &[
    "/docs",
    "/documentation",
    "/guide",
    "/manual",
    "/reference",
    "/api",
    "/developer",
    "/sdk",
    "/tutorial",
];
const BLOG_URL_PATTERNS: &[&str] = &[
    "/blog",
    "/post",
    "/article",
    "/news",
    "/journal",
    "wordpress",
    "medium",
    "blogger",
];

const ECOMMERCE_CONTENT_PATTERNS: &[&str] = &[
    "add to cart",
    "product description",
    "price",
    "shipping",
    "checkout",
];
const DOCUMENTATION_CONTENT_PATTERNS: &[&str] = &[
    "documentation",
    "api reference",
    "getting started",
    "installation",
    "usage",
];
const BLOG_CONTENT_PATTERNS: &[&str] = &["posted on", "author", "comments", "tags", "categories"];

#[derive(Clone)]
pub struct WebsiteAnalyzer {
    crawler: Crawler,
}

impl WebsiteAnalyzer {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            crawler: Crawler::new(config)?,
        })
    }

    pub fn from_crawler(crawler: Crawler) -> Self {
        Self { crawler }
    }

    pub fn crawler(&self) -> &Crawler {
        &self.crawler
    }

    /// Fetch one URL and compute its structure stats.
    pub async fn analyze_url(&self, url: &str) -> Result<PageAnalysis> {
        if !validate_url(url) {
            bail!("Invalid URL: {}", url);
        }

        let page = self.crawler.fetch(url).await?;
        let structure = analyze_structure(&page.markdown);
        info!(url, words = structure.word_count, "Analyzed page");

        Ok(PageAnalysis {
            url: url.to_string(),
            title: page.title,
            markdown: page.markdown,
            internal_links: page.internal_links,
            external_links: page.external_links,
            structure,
        })
    }

    /// Analyze several URLs with at most `max_concurrent` requests in flight.
    ///
    /// Invalid URLs are dropped before fetching. Results come back in input
    /// order.
    pub async fn analyze_urls(
        &self,
        urls: &[String],
        max_concurrent: usize,
    ) -> Vec<(String, Result<PageAnalysis>)> {
        let valid = validate_urls(urls);

        let mut results: Vec<(usize, String, Result<PageAnalysis>)> =
            stream::iter(valid.into_iter().enumerate())
                .map(|(i, url)| async move {
                    let result = self.analyze_url(&url).await;
                    (i, url, result)
                })
                .buffer_unordered(max_concurrent.max(1))
                .collect()
                .await;

        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, u, r)| (u, r)).collect()
    }

    /// Analyze `url` and up to `max_urls - 1` of its internal links.
    ///
    /// A failure on the root URL is an error; failures on linked pages are
    /// logged and skipped.
    pub async fn analyze_website(
        &self,
        url: &str,
        max_urls: usize,
        max_concurrent: usize,
    ) -> Result<SiteAnalysis> {
        if !validate_url(url) {
            bail!("Invalid URL: {}", url);
        }

        let root = self.analyze_url(url).await?;

        let targets: Vec<String> = root
            .internal_links
            .iter()
            .map(|l| l.href.clone())
            .filter(|href| href != url)
            .take(max_urls.saturating_sub(1))
            .collect();

        let mut pages = vec![root];
        for (page_url, result) in self.analyze_urls(&targets, max_concurrent).await {
            match result {
                Ok(page) => pages.push(page),
                Err(e) => warn!(url = %page_url, error = %e, "Skipping page"),
            }
        }

        let structure = site_structure(&pages);
        info!(url, pages = structure.total_pages, "Analyzed website");

        Ok(SiteAnalysis {
            root_url: url.to_string(),
            title: pages[0].title.clone(),
            pages,
            structure,
            website_type: WebsiteType::Generic,
            purpose: String::new(),
        })
    }

    /// Classify a site by URL keywords first, then page content.
    ///
    /// Never fails: an unreachable site is [`WebsiteType::Generic`].
    pub async fn detect_website_type(&self, url: &str) -> WebsiteType {
        if let Some(t) = type_from_url(url) {
            return t;
        }

        match self.analyze_url(url).await {
            Ok(page) => type_from_content(&page.markdown).unwrap_or(WebsiteType::Generic),
            Err(e) => {
                warn!(url, error = %e, "Website type detection failed");
                WebsiteType::Generic
            }
        }
    }
}

/// `crawlrag detect`: print the detected website type.
pub async fn run_detect(config: &Config, url: &str) -> Result<()> {
    if !validate_url(url) {
        bail!("Invalid URL: {}", url);
    }
    let analyzer = WebsiteAnalyzer::new(&config.crawl)?;
    let website_type = analyzer.detect_website_type(url).await;
    info!(url, website_type = %website_type, "Detected website type");
    println!("Detected website type: {}", website_type);
    Ok(())
}

/// Heading, code block, link and word counts for a markdown document.
pub fn analyze_structure(markdown: &str) -> StructureStats {
    let headings = markdown
        .lines()
        .filter(|l| l.starts_with('#'))
        .map(|l| {
            let level = l.chars().take_while(|c| *c == '#').count();
            Heading {
                level,
                text: l[level..].trim().to_string(),
            }
        })
        .collect();

    let word_count = markdown.split_whitespace().count();
    let reading_time_minutes = ((word_count as f64 / WORDS_PER_MINUTE).round() as usize).max(1);

    StructureStats {
        headings,
        code_blocks: markdown.matches("```").count() / 2,
        link_count: markdown.matches("](").count(),
        word_count,
        reading_time_minutes,
    }
}

fn site_structure(pages: &[crate::models::PageAnalysis]) -> SiteStructure {
    let mut link_structure = serde_json::Map::new();
    for page in pages {
        let hrefs = page
            .internal_links
            .iter()
            .map(|l| serde_json::Value::String(l.href.clone()))
            .collect();
        link_structure.insert(page.url.clone(), serde_json::Value::Array(hrefs));
    }

    SiteStructure {
        total_pages: pages.len(),
        total_internal_links: pages.iter().map(|p| p.internal_links.len()).sum(),
        total_external_links: pages.iter().map(|p| p.external_links.len()).sum(),
        link_structure,
    }
}

fn type_from_url(url: &str) -> Option<WebsiteType> {
    let url = url.to_ascii_lowercase();
    if url.contains("github.com") {
        return Some(WebsiteType::Github);
    }
    first_match(
        &url,
        &[
            (WebsiteType::Ecommerce, ECOMMERCE_URL_PATTERNS),
            (WebsiteType::Documentation, DOCUMENTATION_URL_PATTERNS),
            (WebsiteType::Blog, BLOG_URL_PATTERNS),
        ],
    )
}

fn type_from_content(markdown: &str) -> Option<WebsiteType> {
    first_match(
        &markdown.to_lowercase(),
        &[
            (WebsiteType::Ecommerce, ECOMMERCE_CONTENT_PATTERNS),
            (WebsiteType::Documentation, DOCUMENTATION_CONTENT_PATTERNS),
            (WebsiteType::Blog, BLOG_CONTENT_PATTERNS),
        ],
    )
}

fn first_match(haystack: &str, groups: &[(WebsiteType, &[&str])]) -> Option<WebsiteType> {
    groups
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| haystack.contains(p)))
        .map(|(t, _)| *t)
}
