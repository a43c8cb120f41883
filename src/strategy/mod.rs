//! Scraping strategies, one per [`WebsiteType`].
//!
//! Every strategy analyzes a site the same way; they differ in the Python
//! scraper they render from `templates/`. Markdown output is the generic
//! index-plus-pages layout for every type.

mod github;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::analyzer::WebsiteAnalyzer;
use crate::models::{SiteAnalysis, WebsiteType};

pub use github::{is_github_url, parse_github_url, GithubStrategy};

const GENERIC_TEMPLATE: &str = include_str!("templates/generic.py");
const ECOMMERCE_TEMPLATE: &str = include_str!("templates/ecommerce.py");
const DOCUMENTATION_TEMPLATE: &str = include_str!("templates/documentation.py");
const BLOG_TEMPLATE: &str = include_str!("templates/blog.py");

#[async_trait]
pub trait Strategy: Send + Sync {
    fn website_type(&self) -> WebsiteType;

    /// Crawl `url` and up to `max_urls - 1` internal pages.
    async fn analyze(
        &self,
        analyzer: &WebsiteAnalyzer,
        url: &str,
        max_urls: usize,
        max_concurrent: usize,
    ) -> Result<SiteAnalysis> {
        let mut analysis = analyzer.analyze_website(url, max_urls, max_concurrent).await?;
        analysis.website_type = self.website_type();
        Ok(analysis)
    }

    /// Python source for a crawl4ai scraper targeting the analyzed site.
    fn generate_code(&self, analysis: &SiteAnalysis) -> String;

    /// Markdown files keyed by file name.
    fn generate_markdown(&self, analysis: &SiteAnalysis) -> BTreeMap<String, String> {
        site_markdown(analysis)
    }
}

pub struct GenericStrategy;
pub struct EcommerceStrategy;
pub struct DocumentationStrategy;
pub struct BlogStrategy;

#[async_trait]
impl Strategy for GenericStrategy {
    fn website_type(&self) -> WebsiteType {
        WebsiteType::Generic
    }

    fn generate_code(&self, analysis: &SiteAnalysis) -> String {
        render(GENERIC_TEMPLATE, &[("url", &analysis.root_url)])
    }
}

#[async_trait]
impl Strategy for EcommerceStrategy {
    fn website_type(&self) -> WebsiteType {
        WebsiteType::Ecommerce
    }

    fn generate_code(&self, analysis: &SiteAnalysis) -> String {
        render(ECOMMERCE_TEMPLATE, &[("url", &analysis.root_url)])
    }
}

#[async_trait]
impl Strategy for DocumentationStrategy {
    fn website_type(&self) -> WebsiteType {
        WebsiteType::Documentation
    }

    fn generate_code(&self, analysis: &SiteAnalysis) -> String {
        render(DOCUMENTATION_TEMPLATE, &[("url", &analysis.root_url)])
    }
}

#[async_trait]
impl Strategy for BlogStrategy {
    fn website_type(&self) -> WebsiteType {
        WebsiteType::Blog
    }

    fn generate_code(&self, analysis: &SiteAnalysis) -> String {
        render(BLOG_TEMPLATE, &[("url", &analysis.root_url)])
    }
}

/// Pick the strategy for a website type. Documentation sites hosted on
/// GitHub get the GitHub strategy.
pub fn create_strategy(website_type: WebsiteType, url: Option<&str>) -> Box<dyn Strategy> {
    match website_type {
        WebsiteType::Documentation if url.is_some_and(is_github_url) => Box::new(GithubStrategy),
        WebsiteType::Documentation => Box::new(DocumentationStrategy),
        WebsiteType::Ecommerce => Box::new(EcommerceStrategy),
        WebsiteType::Blog => Box::new(BlogStrategy),
        WebsiteType::Github => Box::new(GithubStrategy),
        WebsiteType::Generic => Box::new(GenericStrategy),
    }
}

/// `index.md` with the site summary, plus one file per analyzed page.
pub fn site_markdown(analysis: &SiteAnalysis) -> BTreeMap<String, String> {
    let title = if analysis.title.is_empty() {
        "Website Analysis"
    } else {
        analysis.title.as_str()
    };

    let mut index = format!("# {}\n\nURL: {}\n\n", title, analysis.root_url);
    index.push_str("## Website Structure\n\n");
    index.push_str(&format!(
        "- Total Pages: {}\n- Internal Links: {}\n- External Links: {}\n\n",
        analysis.structure.total_pages,
        analysis.structure.total_internal_links,
        analysis.structure.total_external_links
    ));
    index.push_str("## Pages\n\n");
    for page in &analysis.pages {
        let label = if page.title.is_empty() {
            &page.url
        } else {
            &page.title
        };
        index.push_str(&format!("- [{}]({})\n", label, page.url));
    }

    let mut files = BTreeMap::new();
    for page in &analysis.pages {
        files.insert(page_file_name(&page.url), page.markdown.clone());
    }
    // The summary wins over a page whose last segment is also "index".
    files.insert("index.md".to_string(), index);
    files
}

/// Last path segment of `url` plus `.md`, or `index.md` for a trailing slash.
pub fn page_file_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let segment = match without_scheme.split_once('/') {
        Some((_, path)) => path.rsplit('/').next().unwrap_or(""),
        None => "",
    };
    if segment.is_empty() {
        "index.md".to_string()
    } else {
        format!("{}.md", segment)
    }
}

/// Replace `{name}` placeholders in one pass. Unknown placeholders and
/// substituted values are left as they are.
pub(crate) fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageAnalysis, SiteStructure, StructureStats};

    fn page(url: &str, title: &str, markdown: &str) -> PageAnalysis {
        PageAnalysis {
            url: url.into(),
            title: title.into(),
            markdown: markdown.into(),
            internal_links: vec![],
            external_links: vec![],
            structure: StructureStats::default(),
        }
    }

    fn analysis() -> SiteAnalysis {
        SiteAnalysis {
            root_url: "https://shop.test/".into(),
            title: "Shop".into(),
            pages: vec![
                page("https://shop.test/", "Shop", "# Shop"),
                page("https://shop.test/catalog/shoes", "", "# Shoes"),
            ],
            structure: SiteStructure {
                total_pages: 2,
                total_internal_links: 7,
                total_external_links: 1,
                link_structure: serde_json::Map::new(),
            },
            website_type: WebsiteType::Ecommerce,
            purpose: "Extract product prices".into(),
        }
    }

    #[test]
    fn test_render_single_pass() {
        let out = render(
            "a {url} b {other} c {url}",
            &[("url", "{url}"), ("unused", "x")],
        );
        assert_eq!(out, "a {url} b {other} c {url}");
        assert_eq!(render("x = {url}", &[("url", "https://q.test")]), "x = https://q.test");
        assert_eq!(render("{ unclosed", &[("url", "u")]), "{ unclosed");
    }

    #[test]
    fn test_generate_code_per_type() {
        let a = analysis();
        let code = EcommerceStrategy.generate_code(&a);
        assert!(code.contains("TARGET_URL = \"https://shop.test/\""));
        assert!(code.contains("class Product"));
        assert!(!code.contains("{url}"));

        assert!(BlogStrategy.generate_code(&a).contains("BLOG_URL = \"https://shop.test/\""));
        assert!(DocumentationStrategy
            .generate_code(&a)
            .contains("get_sitemap_urls"));
        assert!(GenericStrategy.generate_code(&a).contains("crawl_website"));
    }

    #[test]
    fn test_generate_markdown_layout() {
        let files = GenericStrategy.generate_markdown(&analysis());
        assert_eq!(
            files.keys().cloned().collect::<Vec<_>>(),
            vec!["index.md".to_string(), "shoes.md".to_string()]
        );
        let index = &files["index.md"];
        assert!(index.starts_with("# Shop\n\nURL: https://shop.test/\n\n## Website Structure"));
        assert!(index.contains("- Total Pages: 2\n- Internal Links: 7\n- External Links: 1"));
        assert!(index.contains("- [https://shop.test/catalog/shoes](https://shop.test/catalog/shoes)"));
        assert_eq!(files["shoes.md"], "# Shoes");
    }

    #[test]
    fn test_page_file_name() {
        assert_eq!(page_file_name("https://a.test/docs/intro"), "intro.md");
        assert_eq!(page_file_name("https://a.test/docs/"), "index.md");
        assert_eq!(page_file_name("https://a.test"), "index.md");
    }

    #[test]
    fn test_create_strategy_routes_github_docs() {
        assert_eq!(
            create_strategy(WebsiteType::Documentation, Some("https://github.com/o/r")).website_type(),
            WebsiteType::Github
        );
        assert_eq!(
            create_strategy(WebsiteType::Documentation, Some("https://docs.test/")).website_type(),
            WebsiteType::Documentation
        );
        assert_eq!(
            create_strategy(WebsiteType::Blog, None).website_type(),
            WebsiteType::Blog
        );
    }
}
