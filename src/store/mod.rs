//! Vector store abstraction.
//!
//! The [`Store`] trait covers every persistence operation the crawlers,
//! retriever, and stats command need, so the backing database is pluggable:
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | `sqlite` | [`sqlite`] | Local file, cosine similarity computed in Rust |
//! | `supabase` | [`supabase`] | PostgREST table plus a `match_*` RPC for similarity |
//! | `memory` | [`memory`] | Process-local, for tests and throwaway runs |
//!
//! Rows are keyed by `(url, chunk_number)`. A URL's first chunk is number 0.

pub mod memory;
pub mod sqlite;
pub mod supabase;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::{NewPage, Page, SimilarPage};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

/// Abstract storage backend for crawled pages.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_page`](Store::save_page) | Upsert a page chunk, stamping crawl metadata |
/// | [`get_page`](Store::get_page) | Fetch one chunk by `(url, chunk_number)` |
/// | [`delete_page`](Store::delete_page) | Delete one chunk or every chunk of a URL |
/// | [`search_similar`](Store::search_similar) | Vector similarity search with a metadata filter |
/// | [`all_urls`](Store::all_urls) | Distinct stored URLs |
/// | [`page_count`](Store::page_count) | Number of stored rows |
/// | [`last_crawled`](Store::last_crawled) | When a URL was last written |
/// | [`should_update`](Store::should_update) | Whether a URL is due for recrawl |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update the row for `(page.url, page.chunk_number)`.
    ///
    /// Adds `url_path`, `crawled_at` (RFC 3339), and `content_length` to the
    /// metadata. `created_at` survives updates; `updated_at` is set to now.
    async fn save_page(&self, page: NewPage) -> Result<Page>;

    async fn get_page(&self, url: &str, chunk_number: i64) -> Result<Option<Page>>;

    /// Delete one chunk, or all chunks of `url` when `chunk_number` is `None`.
    /// Returns the number of rows removed.
    async fn delete_page(&self, url: &str, chunk_number: Option<i64>) -> Result<u64>;

    /// Rows most similar to `query_vec`, best first, keeping only those with
    /// similarity ≥ `threshold` whose metadata contains every key/value of
    /// `filter` (a JSON object; `{}` matches everything).
    async fn search_similar(
        &self,
        query_vec: &[f32],
        limit: usize,
        threshold: f64,
        filter: &serde_json::Value,
    ) -> Result<Vec<SimilarPage>>;

    /// Distinct URLs, sorted.
    async fn all_urls(&self) -> Result<Vec<String>>;

    async fn page_count(&self) -> Result<i64>;

    async fn last_crawled(&self, url: &str) -> Result<Option<DateTime<Utc>>>;

    /// Row counts grouped by `metadata.source` (`"unknown"` when absent),
    /// largest first.
    async fn source_counts(&self) -> Result<Vec<(String, i64)>>;

    /// True if `url` was never crawled or was crawled at least
    /// `max_age_days` days ago.
    async fn should_update(&self, url: &str, max_age_days: i64) -> Result<bool> {
        match self.last_crawled(url).await? {
            None => Ok(true),
            Some(ts) => Ok((Utc::now() - ts).num_days() >= max_age_days),
        }
    }
}

/// Open the backend named by `config.store.backend`.
///
/// The SQLite schema is created if missing so `sync` works without a prior
/// `init`.
pub async fn open_store(config: &Config) -> Result<Box<dyn Store>> {
    match config.store.backend.as_str() {
        "sqlite" => Ok(Box::new(SqliteStore::open(config).await?)),
        "supabase" => Ok(Box::new(SupabaseStore::new(&config.store)?)),
        "memory" => Ok(Box::new(MemoryStore::new())),
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}

/// Merge the crawl stamps into `metadata`, turning non-objects into objects.
pub(crate) fn stamp_metadata(
    metadata: serde_json::Value,
    url: &str,
    content: &str,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let mut map = match metadata {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let url_path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    map.insert("url_path".into(), serde_json::Value::String(url_path));
    map.insert(
        "crawled_at".into(),
        serde_json::Value::String(now.to_rfc3339()),
    );
    map.insert(
        "content_length".into(),
        serde_json::Value::from(content.chars().count()),
    );
    serde_json::Value::Object(map)
}

/// True if `metadata` contains every key/value pair of `filter`.
pub(crate) fn metadata_matches(metadata: &serde_json::Value, filter: &serde_json::Value) -> bool {
    let Some(wanted) = filter.as_object() else {
        return true;
    };
    wanted
        .iter()
        .all(|(k, v)| metadata.get(k).is_some_and(|actual| actual == v))
}

/// Source label used for grouping in [`Store::source_counts`].
pub(crate) fn source_of(metadata: &serde_json::Value) -> String {
    metadata
        .get("source")
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Rank candidates by similarity, apply the threshold, and truncate.
pub(crate) fn rank(mut scored: Vec<SimilarPage>, limit: usize, threshold: f64) -> Vec<SimilarPage> {
    scored.retain(|p| p.similarity >= threshold);
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.page.url.cmp(&b.page.url))
            .then_with(|| a.page.chunk_number.cmp(&b.page.chunk_number))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_metadata() {
        let now = Utc::now();
        let m = stamp_metadata(
            serde_json::json!({"source": "docs"}),
            "https://docs.example.com/guide/intro?x=1",
            "héllo",
            now,
        );
        assert_eq!(m["source"], "docs");
        assert_eq!(m["url_path"], "/guide/intro");
        assert_eq!(m["content_length"], 5);
        assert_eq!(m["crawled_at"], now.to_rfc3339());
    }

    #[test]
    fn test_stamp_replaces_non_object() {
        let m = stamp_metadata(serde_json::json!("junk"), "not a url", "", Utc::now());
        assert_eq!(m["url_path"], "");
        assert_eq!(m["content_length"], 0);
    }

    #[test]
    fn test_metadata_filter() {
        let meta = serde_json::json!({"source": "docs", "chunk_index": 2});
        assert!(metadata_matches(&meta, &serde_json::json!({})));
        assert!(metadata_matches(&meta, &serde_json::json!({"source": "docs"})));
        assert!(!metadata_matches(&meta, &serde_json::json!({"source": "github"})));
        assert!(!metadata_matches(&meta, &serde_json::json!({"missing": 1})));
        assert!(metadata_matches(&meta, &serde_json::Value::Null));
    }
}
