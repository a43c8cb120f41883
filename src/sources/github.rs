//! GitHub repository sync over the REST contents API.
//!
//! Directories are listed recursively up to `github_max_depth`, text files
//! are filtered by extension, and each file is stored whole as chunk 0 of
//! `https://github.com/{repo}/blob/{ref}/{path}`.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use base64::Engine;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::SyncContext;
use crate::config::SourcesConfig;
use crate::models::NewPage;
use crate::progress::SyncProgressEvent;

const SOURCE: &str = "github";
const MAX_CONCURRENT_FETCHES: usize = 10;
const SUMMARY_CHARS: usize = 100;

const TEXT_EXTENSIONS: &[&str] = &[
    "py", "md", "txt", "rst", "json", "yml", "yaml", "toml", "ini", "cfg", "html", "css", "js",
    "ts", "jsx", "tsx", "xml", "csv", "sh", "bat", "ps1",
];

/// True if `name` has an extension on the text allowlist.
pub fn is_text_file(name: &str) -> bool {
    std::path::Path::new(&name.to_ascii_lowercase())
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    path: String,
    #[serde(default)]
    html_url: String,
}

/// Decode a base64 payload that may contain line breaks, as GitHub returns.
pub fn decode_base64_content(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .context("Invalid base64 content")?;
    String::from_utf8(bytes).context("File is not valid UTF-8")
}

/// First 100 characters, with `...` appended when truncated.
pub fn file_summary(content: &str) -> String {
    if content.chars().count() > SUMMARY_CHARS {
        let head: String = content.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

pub struct GithubCrawler<'a> {
    ctx: &'a SyncContext<'a>,
    client: reqwest::Client,
    api_url: String,
    repo: String,
    branch: String,
    token: Option<String>,
    max_depth: u32,
}

impl<'a> GithubCrawler<'a> {
    pub fn new(ctx: &'a SyncContext<'a>, sources: &SourcesConfig, timeout_secs: u64) -> Result<Self> {
        if !sources.github_repo.contains('/') {
            bail!(
                "sources.github_repo must be owner/repo, got '{}'",
                sources.github_repo
            );
        }
        Ok(Self {
            ctx,
            client: crate::http::build_client(timeout_secs, concat!("crawlrag/", env!("CARGO_PKG_VERSION")))?,
            api_url: sources.github_api_url.trim_end_matches('/').to_string(),
            repo: sources.github_repo.clone(),
            branch: sources.github_branch.clone(),
            token: sources.github_token.clone(),
            max_depth: sources.github_max_depth,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = if path.is_empty() {
            format!("{}/repos/{}/contents", self.api_url, self.repo)
        } else {
            format!("{}/repos/{}/contents/{}", self.api_url, self.repo, path)
        };

        let mut req = self
            .client
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, url, body);
        }
        Ok(resp.json().await?)
    }

    /// Text file paths under the repository root, at most `max_depth` levels
    /// deep. Unlistable directories are logged and skipped.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        if self.max_depth == 0 {
            return Ok(Vec::new());
        }

        // The root listing must succeed; deeper failures are tolerated.
        let root: Vec<ContentEntry> = self.get_json("").await?;
        let mut pending = vec![(root, self.max_depth)];
        let mut files = Vec::new();

        while let Some((entries, depth)) = pending.pop() {
            for entry in entries {
                match entry.kind.as_str() {
                    "file" if is_text_file(&entry.name) => files.push(entry.path),
                    "dir" if depth > 1 => match self.get_json::<Vec<ContentEntry>>(&entry.path).await {
                        Ok(children) => pending.push((children, depth - 1)),
                        Err(e) => warn!(path = %entry.path, error = %e, "Error listing directory"),
                    },
                    _ => {}
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Fetch and store one file. Returns false if it was skipped or failed.
    async fn process_file(&self, path: &str, force: bool) -> bool {
        let url = format!("https://github.com/{}/blob/{}/{}", self.repo, self.branch, path);
        if !self.ctx.is_due(&url, force).await {
            return false;
        }

        match self.store_file(path, &url).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(path, error = %e, "Error processing file");
                false
            }
        }
    }

    async fn store_file(&self, path: &str, url: &str) -> Result<bool> {
        let file: FileContent = self.get_json(path).await?;
        if file.kind != "file" {
            bail!("Path is not a file: {}", path);
        }
        let content = if file.encoding == "base64" {
            decode_base64_content(&file.content)?
        } else {
            file.content
        };
        if content.trim().is_empty() {
            warn!(path, "Empty content for file");
            return Ok(false);
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        let head: String = content.chars().take(self.ctx.chunk_size).collect();
        let embedding = self
            .ctx
            .embed_or_empty(&[head])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();

        self.ctx
            .store
            .save_page(NewPage {
                url: url.to_string(),
                chunk_number: 0,
                title: format!("{} - {} GitHub", name, self.repo),
                summary: file_summary(&content),
                metadata: serde_json::json!({
                    "source": SOURCE,
                    "sha": file.sha,
                    "size": file.size,
                    "path": file.path,
                    "url": file.html_url,
                    "repo": self.repo,
                    "ref": self.branch,
                }),
                content,
                embedding,
            })
            .await?;
        info!(path, "Processed file");
        Ok(true)
    }

    /// Store every text file in the repository. Returns the number stored.
    pub async fn sync(&self, force: bool) -> Result<usize> {
        info!(repo = %self.repo, branch = %self.branch, "Starting repository crawl");
        self.ctx.progress.report(SyncProgressEvent::Discovering {
            source: SOURCE.into(),
        });

        let paths = self.list_files().await?;
        let total = paths.len() as u64;
        let done = AtomicU64::new(0);

        let results: Vec<bool> = stream::iter(&paths)
            .map(|path| {
                let done = &done;
                async move {
                    let ok = self.process_file(path, force).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.ctx.progress.report(SyncProgressEvent::Processing {
                        source: SOURCE.into(),
                        n,
                        total,
                    });
                    ok
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let stored = results.iter().filter(|ok| **ok).count();
        self.ctx.progress.report(SyncProgressEvent::Done {
            source: SOURCE.into(),
            stored: stored as u64,
        });
        info!(repo = %self.repo, files = stored, "Completed repository crawl");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::store::Store;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sources(server: &MockServer, depth: u32) -> SourcesConfig {
        SourcesConfig {
            github_repo: "o/r".into(),
            github_api_url: server.uri(),
            github_token: Some("ghp_x".into()),
            github_max_depth: depth,
            ..SourcesConfig::default()
        }
    }

    fn b64(s: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(s);
        // GitHub wraps at 60 columns.
        encoded
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn mount(server: &MockServer, at: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(at))
            .and(query_param("ref", "main"))
            .and(header("authorization", "token ghp_x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_text_extensions() {
        assert!(is_text_file("README.md"));
        assert!(is_text_file("setup.PY"));
        assert!(!is_text_file("logo.png"));
        assert!(!is_text_file("Makefile"));
    }

    #[test]
    fn test_summary_and_decode() {
        assert_eq!(file_summary("short"), "short");
        let long = "x".repeat(150);
        assert_eq!(file_summary(&long), format!("{}...", "x".repeat(100)));
        assert_eq!(decode_base64_content(&b64("hello\nworld")).unwrap(), "hello\nworld");
        assert!(decode_base64_content("!!!").is_err());
    }

    #[tokio::test]
    async fn test_sync_walks_tree_and_stores_files() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/repos/o/r/contents",
            serde_json::json!([
                {"name": "README.md", "path": "README.md", "type": "file"},
                {"name": "logo.png", "path": "logo.png", "type": "file"},
                {"name": "docs", "path": "docs", "type": "dir"},
            ]),
        )
        .await;
        mount(
            &server,
            "/repos/o/r/contents/docs",
            serde_json::json!([
                {"name": "guide.md", "path": "docs/guide.md", "type": "file"},
            ]),
        )
        .await;
        for (p, text) in [("README.md", "# Readme"), ("docs/guide.md", "# Guide")] {
            mount(
                &server,
                &format!("/repos/o/r/contents/{}", p),
                serde_json::json!({
                    "type": "file", "encoding": "base64", "content": b64(text),
                    "sha": "abc", "size": text.len(), "path": p,
                    "html_url": format!("https://github.com/o/r/blob/main/{}", p),
                }),
            )
            .await;
        }

        let fx = Fixture::new();
        let ctx = fx.ctx(5000);
        let crawler = GithubCrawler::new(&ctx, &sources(&server, 3), 10).unwrap();
        assert_eq!(
            crawler.list_files().await.unwrap(),
            vec!["README.md".to_string(), "docs/guide.md".to_string()]
        );
        assert_eq!(crawler.sync(false).await.unwrap(), 2);

        let page = fx
            .store
            .get_page("https://github.com/o/r/blob/main/docs/guide.md", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.title, "guide.md - o/r GitHub");
        assert_eq!(page.content, "# Guide");
        assert_eq!(page.summary, "# Guide");
        assert_eq!(page.metadata["source"], "github");
        assert_eq!(page.metadata["sha"], "abc");
        assert_eq!(page.embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_depth_one_skips_directories() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/repos/o/r/contents",
            serde_json::json!([
                {"name": "a.py", "path": "a.py", "type": "file"},
                {"name": "docs", "path": "docs", "type": "dir"},
            ]),
        )
        .await;
        let fx = Fixture::new();
        let ctx = fx.ctx(5000);
        let crawler = GithubCrawler::new(&ctx, &sources(&server, 1), 10).unwrap();
        assert_eq!(crawler.list_files().await.unwrap(), vec!["a.py".to_string()]);
    }

    #[test]
    fn test_repo_must_have_owner() {
        let fx = Fixture::new();
        let ctx = fx.ctx(5000);
        let cfg = SourcesConfig {
            github_repo: "noslash".into(),
            ..SourcesConfig::default()
        };
        assert!(GithubCrawler::new(&ctx, &cfg, 10).is_err());
    }
}
