//! Page fetching over plain HTTP.
//!
//! [`Crawler::fetch`] downloads a URL and converts it with [`crate::html`].
//! Non-HTML text responses (markdown, plain text) pass through unchanged.
//! [`Crawler::fetch_sitemap`] reads `<loc>` entries from `sitemap.xml`,
//! following one level of `<sitemapindex>`.

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::html::parse_html;
use crate::models::Link;

/// A fetched and converted page.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledPage {
    /// Final URL after redirects.
    pub url: String,
    pub title: String,
    pub markdown: String,
    pub internal_links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub images: Vec<String>,
}

#[derive(Clone)]
pub struct Crawler {
    client: reqwest::Client,
}

impl Crawler {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = crate::http::build_client(config.request_timeout_secs, &config.user_agent)?;
        Ok(Self { client })
    }

    /// Fetch `url` and convert it to markdown. HTTP error statuses fail.
    pub async fn fetch(&self, url: &str) -> Result<CrawledPage> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Failed to fetch {}: HTTP {}", url, status);
        }

        let final_url = resp.url().clone();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();
        let body = resp.text().await?;
        debug!(url = %final_url, bytes = body.len(), %content_type, "Fetched page");

        if content_type.contains("html") || content_type.contains("xml") {
            let page = parse_html(&body, &final_url)?;
            Ok(CrawledPage {
                url: final_url.to_string(),
                title: page.title,
                markdown: page.markdown,
                internal_links: page.internal_links,
                external_links: page.external_links,
                images: page.images,
            })
        } else if content_type.starts_with("text/") {
            let title = body
                .lines()
                .find(|l| l.starts_with('#'))
                .map(|l| l.trim_start_matches('#').trim().to_string())
                .unwrap_or_default();
            Ok(CrawledPage {
                url: final_url.to_string(),
                title,
                markdown: body.trim().to_string(),
                internal_links: Vec::new(),
                external_links: Vec::new(),
                images: Vec::new(),
            })
        } else {
            bail!("Unsupported content type for {}: {}", url, content_type)
        }
    }

    /// URLs listed in `<base_url>/sitemap.xml`, in document order, deduplicated.
    pub async fn fetch_sitemap(&self, base_url: &str) -> Result<Vec<String>> {
        let sitemap_url = format!("{}/sitemap.xml", base_url.trim_end_matches('/'));
        let xml = self.get_text(&sitemap_url).await?;
        let (mut urls, children) = parse_sitemap(&xml)
            .with_context(|| format!("Failed to parse sitemap {}", sitemap_url))?;

        for child in children {
            match self.get_text(&child).await {
                Ok(xml) => match parse_sitemap(&xml) {
                    Ok((more, _)) => urls.extend(more),
                    Err(e) => warn!(sitemap = %child, error = %e, "Skipping unparsable sitemap"),
                },
                Err(e) => warn!(sitemap = %child, error = %e, "Skipping unreachable sitemap"),
            }
        }

        let mut seen = std::collections::HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        Ok(urls)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Failed to fetch {}: HTTP {}", url, status);
        }
        Ok(resp.text().await?)
    }
}

/// Split a sitemap document into page URLs and nested sitemap URLs.
pub fn parse_sitemap(xml: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut pages = Vec::new();
    let mut sitemaps = Vec::new();
    let mut in_loc = false;
    let mut in_sitemap = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = true,
                b"sitemap" => in_sitemap = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_loc => {
                let loc = te.unescape().unwrap_or_default().trim().to_string();
                if !loc.is_empty() {
                    if in_sitemap {
                        sitemaps.push(loc);
                    } else {
                        pages.push(loc);
                    }
                }
            }
            Ok(quick_xml::events::Event::CData(cd)) if in_loc => {
                let loc = String::from_utf8_lossy(&cd.into_inner()).trim().to_string();
                if !loc.is_empty() {
                    if in_sitemap {
                        sitemaps.push(loc);
                    } else {
                        pages.push(loc);
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"sitemap" => in_sitemap = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("XML error at {}: {}", reader.buffer_position(), e),
            _ => {}
        }
        buf.clear();
    }

    Ok((pages, sitemaps))
}
