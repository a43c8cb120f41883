//! GitHub repository sync through an MCP server's `search_repositories` and
//! `get_file_contents` tools.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use super::McpClient;
use crate::models::{GithubRepoRef, NewPage};
use crate::progress::SyncProgressEvent;
use crate::sources::github::{decode_base64_content, file_summary, is_text_file};
use crate::sources::SyncContext;
use crate::strategy::parse_github_url;

const SOURCE: &str = "mcp";
const README: &str = "README.md";
const MAX_CONCURRENT_CALLS: usize = 4;

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    #[serde(default)]
    sha: String,
}

pub struct GithubMcpScraper<'a> {
    client: McpClient,
    ctx: &'a SyncContext<'a>,
    max_depth: u32,
}

impl<'a> GithubMcpScraper<'a> {
    pub fn new(client: McpClient, ctx: &'a SyncContext<'a>, max_depth: u32) -> Self {
        Self {
            client,
            ctx,
            max_depth: max_depth.max(1),
        }
    }

    /// Store the README and every text file under the URL's path. Returns
    /// the number of files stored.
    pub async fn scrape_repository(&self, url: &str, force: bool) -> Result<usize> {
        let target = parse_github_url(url);
        if target.owner.is_empty() || target.repo.is_empty() {
            bail!("Not a GitHub repository URL: {}", url);
        }
        info!(repo = %target.full_repo, branch = %target.branch, "Syncing repository over MCP");
        self.ctx.progress.report(SyncProgressEvent::Discovering {
            source: SOURCE.into(),
        });

        self.check_repository(&target).await?;

        let mut paths = BTreeSet::new();
        paths.insert(README.to_string());
        paths.extend(self.list_files(&target).await);
        let paths: Vec<String> = paths.into_iter().collect();

        let total = paths.len() as u64;
        let done = AtomicU64::new(0);
        let stored: Vec<bool> = stream::iter(&paths)
            .map(|path| {
                let (done, target) = (&done, &target);
                async move {
                    let ok = self.process_file(target, path, force).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.ctx.progress.report(SyncProgressEvent::Processing {
                        source: SOURCE.into(),
                        n,
                        total,
                    });
                    ok
                }
            })
            .buffer_unordered(MAX_CONCURRENT_CALLS)
            .collect()
            .await;

        let count = stored.iter().filter(|ok| **ok).count();
        self.ctx.progress.report(SyncProgressEvent::Done {
            source: SOURCE.into(),
            stored: count as u64,
        });
        info!(repo = %target.full_repo, files = count, "Repository sync completed");
        Ok(count)
    }

    async fn check_repository(&self, target: &GithubRepoRef) -> Result<()> {
        let result = self
            .client
            .call_tool(
                "search_repositories",
                serde_json::json!({ "query": format!("repo:{}", target.full_repo) }),
            )
            .await?;
        let found = result
            .get("items")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        if !found {
            bail!("Repository {} not found", target.full_repo);
        }
        Ok(())
    }

    async fn get_contents(&self, target: &GithubRepoRef, path: &str) -> Result<Value> {
        let value = self
            .client
            .call_tool(
                "get_file_contents",
                serde_json::json!({
                    "owner": target.owner,
                    "repo": target.repo,
                    "path": path,
                    "branch": target.branch,
                }),
            )
            .await?;
        Ok(value)
    }

    /// Text files under the URL's path, at most `max_depth` directory levels
    /// deep. Listing failures are logged and that directory is skipped.
    async fn list_files(&self, target: &GithubRepoRef) -> Vec<String> {
        let mut files = Vec::new();
        let mut pending = vec![(target.path.clone(), self.max_depth)];

        while let Some((dir, depth)) = pending.pop() {
            let listing = match self.get_contents(target, &dir).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(path = %dir, error = %e, "Error getting directory contents");
                    continue;
                }
            };
            if listing.get("content").is_some() {
                // The path named a single file.
                if is_text_file(&dir) {
                    files.push(dir);
                }
                continue;
            }
            let entries: Vec<Entry> = serde_json::from_value(listing).unwrap_or_default();

            for entry in entries {
                if entry.path.starts_with(".git/") {
                    continue;
                }
                match entry.kind.as_str() {
                    "file" if is_text_file(&entry.path) => files.push(entry.path),
                    "dir" if depth > 1 => pending.push((entry.path, depth - 1)),
                    _ => {}
                }
            }
        }

        files
    }

    async fn process_file(&self, target: &GithubRepoRef, path: &str, force: bool) -> bool {
        let url = format!(
            "https://github.com/{}/blob/{}/{}",
            target.full_repo, target.branch, path
        );
        if !self.ctx.is_due(&url, force).await {
            info!(path, "Skipping, recently synced");
            return false;
        }
        match self.store_file(target, path, &url).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(path, error = %e, "Error processing file");
                false
            }
        }
    }

    async fn store_file(&self, target: &GithubRepoRef, path: &str, url: &str) -> Result<bool> {
        let value = self.get_contents(target, path).await?;
        let file: FileContent = serde_json::from_value(value)?;
        let content = if file.encoding == "base64" {
            decode_base64_content(&file.content)?
        } else {
            file.content
        };
        if content.trim().is_empty() {
            warn!(path, "File found but content is empty");
            return Ok(false);
        }

        let name = path.rsplit('/').next().unwrap_or(path);
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
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
                title: format!("{} - {}", name, target.full_repo),
                summary: file_summary(&content),
                metadata: serde_json::json!({
                    "source": SOURCE,
                    "repo": target.full_repo,
                    "owner": target.owner,
                    "repo_name": target.repo,
                    "branch": target.branch,
                    "path": path,
                    "type": "file",
                    "sha": file.sha,
                    "content_length": content.chars().count(),
                    "file_extension": extension,
                }),
                content,
                embedding,
            })
            .await?;
        info!(path, "Processed file");
        Ok(true)
    }
}
