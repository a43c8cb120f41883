//! Core data models used throughout crawlrag.
//!
//! Stored rows ([`Page`]), website analysis results, and the website type
//! that selects a scraping strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A row in the vector store. Keyed by `(url, chunk_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub chunk_number: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for [`Store::save_page`](crate::store::Store::save_page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPage {
    pub url: String,
    pub chunk_number: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

impl NewPage {
    pub fn new(url: impl Into<String>, chunk_number: i64, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chunk_number,
            title: String::new(),
            summary: String::new(),
            content: content.into(),
            metadata: serde_json::json!({}),
            embedding: Vec::new(),
        }
    }
}

/// A stored page plus its similarity to a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarPage {
    #[serde(flatten)]
    pub page: Page,
    pub similarity: f64,
}

/// Website category used to pick a scraping strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WebsiteType {
    Generic,
    Ecommerce,
    Documentation,
    Blog,
    Github,
}

impl WebsiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebsiteType::Generic => "generic",
            WebsiteType::Ecommerce => "ecommerce",
            WebsiteType::Documentation => "documentation",
            WebsiteType::Blog => "blog",
            WebsiteType::Github => "github",
        }
    }
}

impl fmt::Display for WebsiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebsiteType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(WebsiteType::Generic),
            "ecommerce" => Ok(WebsiteType::Ecommerce),
            "documentation" | "docs" => Ok(WebsiteType::Documentation),
            "blog" => Ok(WebsiteType::Blog),
            "github" => Ok(WebsiteType::Github),
            other => anyhow::bail!(
                "Unknown website type: '{}'. Must be generic, ecommerce, documentation, blog, or github.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Counts derived from a page's markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureStats {
    pub headings: Vec<Heading>,
    pub code_blocks: usize,
    pub link_count: usize,
    pub word_count: usize,
    pub reading_time_minutes: usize,
}

/// Result of analyzing a single URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub url: String,
    pub title: String,
    pub markdown: String,
    pub internal_links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub structure: StructureStats,
}

/// Link counts across every analyzed page of a site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteStructure {
    pub total_pages: usize,
    pub total_internal_links: usize,
    pub total_external_links: usize,
    /// Page URL → internal link targets found on that page, in crawl order.
    pub link_structure: serde_json::Map<String, serde_json::Value>,
}

/// Result of analyzing a root URL and some of its internal pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAnalysis {
    pub root_url: String,
    pub title: String,
    pub pages: Vec<PageAnalysis>,
    pub structure: SiteStructure,
    pub website_type: WebsiteType,
    pub purpose: String,
}

impl SiteAnalysis {
    pub fn page(&self, url: &str) -> Option<&PageAnalysis> {
        self.pages.iter().find(|p| p.url == url)
    }
}

/// A GitHub repository reference parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
    /// `owner/repo`.
    pub full_repo: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_website_type_parse_and_display() {
        for t in [
            WebsiteType::Generic,
            WebsiteType::Ecommerce,
            WebsiteType::Documentation,
            WebsiteType::Blog,
            WebsiteType::Github,
        ] {
            assert_eq!(t.to_string().parse::<WebsiteType>().unwrap(), t);
        }
        assert_eq!("Docs".parse::<WebsiteType>().unwrap(), WebsiteType::Documentation);
        assert!("forum".parse::<WebsiteType>().is_err());
    }

    #[test]
    fn test_similar_page_serializes_flat() {
        let page = Page {
            url: "https://a.test/x".into(),
            chunk_number: 0,
            title: "X".into(),
            summary: String::new(),
            content: "body".into(),
            metadata: serde_json::json!({}),
            embedding: vec![],
            created_at: 1,
            updated_at: 2,
        };
        let v = serde_json::to_value(SimilarPage {
            page,
            similarity: 0.5,
        })
        .unwrap();
        assert_eq!(v["url"], "https://a.test/x");
        assert_eq!(v["similarity"], 0.5);
    }
}
