//! `analyze`: crawl a site, pick a strategy, and emit code and markdown.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::analyzer::WebsiteAnalyzer;
use crate::config::Config;
use crate::exporter::write_markdown_files;
use crate::models::{SiteAnalysis, WebsiteType};
use crate::strategy::create_strategy;
use crate::validate::{validate_urls, ScrapingPurpose};

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Detected from the site when `None`.
    pub website_type: Option<WebsiteType>,
    pub output_code: bool,
    pub output_markdown: bool,
    pub output_dir: PathBuf,
    pub max_urls: usize,
    pub max_concurrent: usize,
}

impl AnalyzeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            website_type: None,
            output_code: true,
            output_markdown: false,
            output_dir: config.output.markdown_dir.clone(),
            max_urls: config.crawl.max_urls,
            max_concurrent: config.crawl.max_concurrent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    pub analysis: SiteAnalysis,
    pub website_type: WebsiteType,
    pub code: Option<String>,
    /// Sanitized file name → written path. Empty unless markdown was requested.
    pub markdown_files: BTreeMap<String, PathBuf>,
}

/// Analyze the first valid URL in `urls` and generate the requested outputs.
pub async fn analyze_and_generate(
    analyzer: &WebsiteAnalyzer,
    urls: &[String],
    purpose: &ScrapingPurpose,
    opts: &AnalyzeOptions,
) -> Result<AnalyzeOutcome> {
    purpose.validate()?;

    let valid = validate_urls(urls);
    let Some(url) = valid.first() else {
        bail!("No valid URLs to analyze");
    };

    let website_type = match opts.website_type {
        Some(t) => t,
        None => analyzer.detect_website_type(url).await,
    };
    info!(url = %url, website_type = %website_type, "Analyzing website");

    let strategy = create_strategy(website_type, Some(url));
    let mut analysis = strategy
        .analyze(analyzer, url, opts.max_urls, opts.max_concurrent)
        .await
        .with_context(|| format!("Error analyzing website {}", url))?;
    analysis.purpose = purpose.description.clone();

    let code = opts.output_code.then(|| strategy.generate_code(&analysis));

    let markdown_files = if opts.output_markdown {
        write_markdown_files(&strategy.generate_markdown(&analysis), &opts.output_dir)?
    } else {
        BTreeMap::new()
    };

    Ok(AnalyzeOutcome {
        website_type: analysis.website_type,
        analysis,
        code,
        markdown_files,
    })
}

/// `crawlrag analyze`: run the pipeline and report to stdout.
pub async fn run_analyze(
    config: &Config,
    url: &str,
    purpose: &ScrapingPurpose,
    opts: &AnalyzeOptions,
) -> Result<()> {
    println!("Analyzing {}...", url);

    let analyzer = WebsiteAnalyzer::new(&config.crawl)?;
    let outcome = analyze_and_generate(&analyzer, &[url.to_string()], purpose, opts).await?;

    println!("Analysis completed successfully!");
    println!(
        "Website type: {}  Pages analyzed: {}",
        outcome.website_type, outcome.analysis.structure.total_pages
    );

    if let Some(code) = &outcome.code {
        let rule = "=".repeat(80);
        println!("\nGenerated Code:");
        println!("{}", rule);
        println!("{}", code);
        println!("{}", rule);

        let path = &config.output.code_file;
        std::fs::write(path, code)
            .with_context(|| format!("Failed to write code file: {}", path.display()))?;
        println!("\nCode saved to {}", path.display());
    }

    if opts.output_markdown {
        println!("\nGenerated {} markdown files:", outcome.markdown_files.len());
        for path in outcome.markdown_files.values() {
            println!("- {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn docs_site() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><head><title>Docs</title></head><body><h1>Getting Started</h1>\
                 <p>Installation and usage. <a href=\"/intro\">Intro</a></p></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/intro"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h1>Intro</h1><p>Welcome.</p></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;
        server
    }

    fn opts(dir: PathBuf) -> AnalyzeOptions {
        AnalyzeOptions {
            website_type: None,
            output_code: true,
            output_markdown: true,
            output_dir: dir,
            max_urls: 5,
            max_concurrent: 2,
        }
    }

    #[tokio::test]
    async fn test_detects_type_and_writes_outputs() {
        let server = docs_site().await;
        let tmp = TempDir::new().unwrap();
        let analyzer = WebsiteAnalyzer::new(&CrawlConfig::default()).unwrap();
        let purpose = ScrapingPurpose::new("Extract the documentation pages", 1);

        let outcome = analyze_and_generate(
            &analyzer,
            &[format!("{}/", server.uri())],
            &purpose,
            &opts(tmp.path().join("md")),
        )
        .await
        .unwrap();

        assert_eq!(outcome.website_type, WebsiteType::Documentation);
        assert_eq!(outcome.analysis.purpose, "Extract the documentation pages");
        assert_eq!(outcome.analysis.pages.len(), 2);
        assert!(outcome.code.unwrap().contains("get_sitemap_urls"));
        assert!(outcome.markdown_files.contains_key("index.md"));
        assert!(outcome.markdown_files.contains_key("intro.md"));
        assert!(tmp.path().join("md").join("intro.md").exists());
    }

    #[tokio::test]
    async fn test_explicit_type_and_no_outputs() {
        let server = docs_site().await;
        let tmp = TempDir::new().unwrap();
        let analyzer = WebsiteAnalyzer::new(&CrawlConfig::default()).unwrap();
        let mut o = opts(tmp.path().join("md"));
        o.website_type = Some(WebsiteType::Blog);
        o.output_code = false;
        o.output_markdown = false;

        let outcome = analyze_and_generate(
            &analyzer,
            &[format!("{}/", server.uri())],
            &ScrapingPurpose::new("Extract website content", 1),
            &o,
        )
        .await
        .unwrap();
        assert_eq!(outcome.website_type, WebsiteType::Blog);
        assert!(outcome.code.is_none());
        assert!(outcome.markdown_files.is_empty());
        assert!(!tmp.path().join("md").exists());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let analyzer = WebsiteAnalyzer::new(&CrawlConfig::default()).unwrap();
        let tmp = TempDir::new().unwrap();
        let o = opts(tmp.path().to_path_buf());

        let err = analyze_and_generate(
            &analyzer,
            &["not a url".to_string()],
            &ScrapingPurpose::new("Extract website content", 1),
            &o,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("No valid URLs"));

        assert!(analyze_and_generate(
            &analyzer,
            &["https://x.test/".to_string()],
            &ScrapingPurpose::new("hi", 1),
            &o,
        )
        .await
        .is_err());
    }
}
