//! SQLite-backed [`Store`].
//!
//! Embeddings are stored as little-endian `f32` BLOBs. Similarity search
//! loads every embedded row and computes cosine similarity in Rust, which is
//! fine at crawl-sized volumes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{NewPage, Page, SimilarPage};

use super::{metadata_matches, rank, source_of, stamp_metadata, Store};

const PAGE_COLUMNS: &str =
    "url, chunk_number, title, summary, content, metadata_json, embedding, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect using `[db]` settings and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn row_to_page(row: &SqliteRow) -> Result<Page> {
    let metadata_json: String = row.get("metadata_json");
    let blob: Option<Vec<u8>> = row.get("embedding");
    Ok(Page {
        url: row.get("url"),
        chunk_number: row.get("chunk_number"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        metadata: serde_json::from_str(&metadata_json)
            .context("Corrupt metadata_json in site_pages")?,
        embedding: blob.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_page(&self, page: NewPage) -> Result<Page> {
        let now = Utc::now();
        let ts = now.timestamp();
        let metadata = stamp_metadata(page.metadata, &page.url, &page.content, now);
        let source = source_of(&metadata);
        let embedding = if page.embedding.is_empty() {
            None
        } else {
            Some(vec_to_blob(&page.embedding))
        };

        sqlx::query(
            r#"
            INSERT INTO site_pages
                (url, chunk_number, title, summary, content, metadata_json, source,
                 embedding, dims, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url, chunk_number) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                content = excluded.content,
                metadata_json = excluded.metadata_json,
                source = excluded.source,
                embedding = excluded.embedding,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&page.url)
        .bind(page.chunk_number)
        .bind(&page.title)
        .bind(&page.summary)
        .bind(&page.content)
        .bind(serde_json::to_string(&metadata)?)
        .bind(&source)
        .bind(embedding)
        .bind(page.embedding.len() as i64)
        .bind(content_hash(&page.content))
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await?;

        debug!(url = %page.url, chunk = page.chunk_number, "Saved page");

        self.get_page(&page.url, page.chunk_number)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page vanished after upsert: {}", page.url))
    }

    async fn get_page(&self, url: &str, chunk_number: i64) -> Result<Option<Page>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM site_pages WHERE url = ? AND chunk_number = ?",
            PAGE_COLUMNS
        ))
        .bind(url)
        .bind(chunk_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_page).transpose()
    }

    async fn delete_page(&self, url: &str, chunk_number: Option<i64>) -> Result<u64> {
        let result = match chunk_number {
            Some(n) => {
                sqlx::query("DELETE FROM site_pages WHERE url = ? AND chunk_number = ?")
                    .bind(url)
                    .bind(n)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM site_pages WHERE url = ?")
                    .bind(url)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        limit: usize,
        threshold: f64,
        filter: &serde_json::Value,
    ) -> Result<Vec<SimilarPage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM site_pages WHERE embedding IS NOT NULL AND dims = ?",
            PAGE_COLUMNS
        ))
        .bind(query_vec.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let page = row_to_page(row)?;
            if !metadata_matches(&page.metadata, filter) {
                continue;
            }
            let similarity = cosine_similarity(query_vec, &page.embedding) as f64;
            scored.push(SimilarPage { page, similarity });
        }

        Ok(rank(scored, limit, threshold))
    }

    async fn all_urls(&self) -> Result<Vec<String>> {
        let urls: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT url FROM site_pages ORDER BY url")
                .fetch_all(&self.pool)
                .await?;
        Ok(urls)
    }

    async fn page_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM site_pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn last_crawled(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM site_pages WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    async fn source_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM site_pages GROUP BY source ORDER BY n DESC, source",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("source"), r.get::<i64, _>("n")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data").join("test.sqlite");
        let store = SqliteStore::open(&config).await.unwrap();
        (tmp, store)
    }

    fn page(url: &str, chunk: i64, content: &str, embedding: Vec<f32>) -> NewPage {
        NewPage {
            title: format!("Title {}", chunk),
            metadata: serde_json::json!({"source": "docs"}),
            embedding,
            ..NewPage::new(url, chunk, content)
        }
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let (_tmp, store) = open_temp().await;
        let saved = store
            .save_page(page("https://a.test/docs/x", 0, "hello", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(saved.metadata["url_path"], "/docs/x");

        let got = store.get_page("https://a.test/docs/x", 0).await.unwrap().unwrap();
        assert_eq!(got.content, "hello");
        assert_eq!(got.embedding, vec![1.0, 0.0]);
        assert!(store.get_page("https://a.test/docs/x", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let (_tmp, store) = open_temp().await;
        let first = store.save_page(page("https://a.test/", 0, "v1", vec![])).await.unwrap();
        let second = store.save_page(page("https://a.test/", 0, "v2", vec![])).await.unwrap();
        assert_eq!(second.content, "v2");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.page_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_single_and_all() {
        let (_tmp, store) = open_temp().await;
        for i in 0..3 {
            store.save_page(page("https://a.test/p", i, "x", vec![])).await.unwrap();
        }
        assert_eq!(store.delete_page("https://a.test/p", Some(1)).await.unwrap(), 1);
        assert_eq!(store.delete_page("https://a.test/p", None).await.unwrap(), 2);
        assert_eq!(store.page_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_ranks_filters_and_skips_unembedded() {
        let (_tmp, store) = open_temp().await;
        store.save_page(page("https://a.test/1", 0, "one", vec![1.0, 0.0])).await.unwrap();
        store.save_page(page("https://a.test/2", 0, "two", vec![0.7, 0.7])).await.unwrap();
        store.save_page(page("https://a.test/3", 0, "three", vec![])).await.unwrap();
        let mut other = page("https://b.test/1", 0, "gh", vec![1.0, 0.0]);
        other.metadata = serde_json::json!({"source": "github"});
        store.save_page(other).await.unwrap();

        let hits = store
            .search_similar(&[1.0, 0.0], 10, 0.0, &serde_json::json!({"source": "docs"}))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page.url, "https://a.test/1");
        assert!(hits[0].similarity > hits[1].similarity);

        let strict = store
            .search_similar(&[1.0, 0.0], 10, 0.9, &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(strict.len(), 2);
        assert!(strict.iter().all(|h| h.similarity >= 0.9));
    }

    #[tokio::test]
    async fn test_urls_counts_and_freshness() {
        let (_tmp, store) = open_temp().await;
        store.save_page(page("https://b.test/", 0, "x", vec![])).await.unwrap();
        store.save_page(page("https://a.test/", 0, "x", vec![])).await.unwrap();
        store.save_page(page("https://a.test/", 1, "y", vec![])).await.unwrap();

        assert_eq!(
            store.all_urls().await.unwrap(),
            vec!["https://a.test/".to_string(), "https://b.test/".to_string()]
        );
        assert_eq!(store.source_counts().await.unwrap(), vec![("docs".to_string(), 3)]);
        assert!(store.last_crawled("https://a.test/").await.unwrap().is_some());
        assert!(store.last_crawled("https://c.test/").await.unwrap().is_none());
        assert!(!store.should_update("https://a.test/", 7).await.unwrap());
        assert!(store.should_update("https://a.test/", 0).await.unwrap());
        assert!(store.should_update("https://c.test/", 7).await.unwrap());
    }
}
