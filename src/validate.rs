//! Input validation for URLs, output filenames, and scraping purposes.

use anyhow::{bail, Result};
use tracing::warn;
use url::Url;

/// True if `url` parses with an `http`/`https` scheme and a host.
pub fn validate_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Keep the valid URLs, warning about each one dropped.
pub fn validate_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|url| {
            let ok = validate_url(url);
            if !ok {
                warn!(url = %url, "Skipping invalid URL");
            }
            ok
        })
        .cloned()
        .collect()
}

/// Make `name` safe to use as a filename on any common filesystem.
///
/// Reserved characters become `_`, runs of `_` collapse to one, leading and
/// trailing `_` are trimmed, and an empty result becomes `"unnamed"`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            other => other,
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// What the user wants scraped, as given to `crawlrag analyze`.
#[derive(Debug, Clone)]
pub struct ScrapingPurpose {
    pub description: String,
    pub max_depth: u32,
}

impl ScrapingPurpose {
    pub fn new(description: impl Into<String>, max_depth: u32) -> Self {
        Self {
            description: description.into(),
            max_depth,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.description.chars().count();
        if !(5..=500).contains(&len) {
            bail!("Purpose must be between 5 and 500 characters (got {})", len);
        }
        if self.description.split_whitespace().count() < 3 {
            bail!("Purpose must contain at least 3 words");
        }
        if self.max_depth > 5 {
            bail!("max_depth must be between 0 and 5 (got {})", self.max_depth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com"));
        assert!(validate_url("http://localhost:8080/docs?q=1"));
        assert!(!validate_url("example.com"));
        assert!(!validate_url("ftp://example.com/file"));
        assert!(!validate_url("https://"));
        assert!(!validate_url(""));
    }

    #[test]
    fn test_validate_urls_filters() {
        let urls = vec![
            "https://a.test".to_string(),
            "not a url".to_string(),
            "https://b.test/x".to_string(),
        ];
        assert_eq!(
            validate_urls(&urls),
            vec!["https://a.test".to_string(), "https://b.test/x".to_string()]
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("docs/intro:part?1"), "docs_intro_part_1");
        assert_eq!(sanitize_filename("a//b"), "a_b");
        assert_eq!(sanitize_filename("__x__"), "x");
        assert_eq!(sanitize_filename("<>|"), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("page.md"), "page.md");
    }

    #[test]
    fn test_purpose_validation() {
        assert!(ScrapingPurpose::new("Extract website content", 1).validate().is_ok());
        assert!(ScrapingPurpose::new("Two words", 1).validate().is_err());
        assert!(ScrapingPurpose::new("abc", 1).validate().is_err());
        assert!(ScrapingPurpose::new("x ".repeat(300), 1).validate().is_err());
        assert!(ScrapingPurpose::new("Extract all product prices", 6)
            .validate()
            .is_err());
        assert!(ScrapingPurpose::new("Extract all product prices", 0)
            .validate()
            .is_ok());
    }
}
