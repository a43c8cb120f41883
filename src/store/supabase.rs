//! Supabase (PostgREST) [`Store`].
//!
//! Expects a table shaped like:
//!
//! ```sql
//! create table site_pages (
//!     id bigserial primary key,
//!     url varchar not null,
//!     chunk_number integer not null,
//!     title varchar not null,
//!     summary varchar not null,
//!     content text not null,
//!     metadata jsonb not null default '{}'::jsonb,
//!     embedding vector(1536),
//!     created_at timestamptz not null default now(),
//!     unique(url, chunk_number)
//! );
//! ```
//!
//! plus a `match_site_pages(query_embedding, match_count, filter)` function
//! returning rows with a `similarity` column. Table and function names come
//! from `[store]`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::models::{NewPage, Page, SimilarPage};

use super::{rank, source_of, stamp_metadata, Store};

/// Rows per request for full-table reads. Matches PostgREST's default
/// `db-max-rows`.
const PAGE_SIZE: usize = 1000;

pub struct SupabaseStore {
    base_url: String,
    key: String,
    table: String,
    match_function: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    /// Build a client from `[store]`. Fails if `SUPABASE_URL` or
    /// `SUPABASE_KEY` was not provided.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base_url = match &config.supabase_url {
            Some(u) => u.trim_end_matches('/').to_string(),
            None => bail!("SUPABASE_URL environment variable not set"),
        };
        let key = match &config.supabase_key {
            Some(k) => k.clone(),
            None => bail!("SUPABASE_KEY environment variable not set"),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            key,
            table: config.table.clone(),
            match_function: config.match_function.clone(),
            client,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }

    async fn send_json(&self, req: RequestBuilder, what: &str) -> Result<serde_json::Value> {
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Supabase {} failed ({}): {}", what, status, body);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON from Supabase {}", what))
    }

    async fn select(&self, params: &[(&str, String)], what: &str) -> Result<Vec<serde_json::Value>> {
        let req = self.client.get(self.table_url()).query(params);
        Ok(as_rows(self.send_json(req, what).await?))
    }

    /// Like [`select`](Self::select) but pages with `limit`/`offset` until a
    /// short page comes back, so the server's row cap cannot truncate.
    async fn select_all(
        &self,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut paged = params.to_vec();
            paged.push(("order", "url,chunk_number".to_string()));
            paged.push(("limit", PAGE_SIZE.to_string()));
            paged.push(("offset", offset.to_string()));
            let rows = self.select(&paged, what).await?;
            let n = rows.len();
            out.extend(rows);
            if n < PAGE_SIZE {
                break;
            }
            offset += n;
        }
        debug!(rows = out.len(), what, "Paged Supabase select");
        Ok(out)
    }
}

fn as_rows(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Parse a timestamp column that may be RFC 3339 text or unix seconds.
fn parse_ts(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    match value? {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        serde_json::Value::Number(n) => n.as_i64().and_then(|t| DateTime::from_timestamp(t, 0)),
        _ => None,
    }
}

/// pgvector columns come back as either a JSON array or a `"[1,2,3]"` string.
fn parse_embedding(value: Option<&serde_json::Value>) -> Vec<f32> {
    let array = match value {
        Some(serde_json::Value::Array(a)) => a.clone(),
        Some(serde_json::Value::String(s)) => serde_json::from_str::<Vec<serde_json::Value>>(s)
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    array
        .iter()
        .filter_map(|v| v.as_f64())
        .map(|v| v as f32)
        .collect()
}

fn row_to_page(row: &serde_json::Value) -> Result<Page> {
    let url = row
        .get("url")
        .and_then(|u| u.as_str())
        .ok_or_else(|| anyhow::anyhow!("Supabase row missing url"))?
        .to_string();
    let text = |key: &str| {
        row.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let metadata = row
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let crawled = parse_ts(metadata.get("crawled_at"));
    let created = parse_ts(row.get("created_at")).or(crawled);

    Ok(Page {
        chunk_number: row.get("chunk_number").and_then(|n| n.as_i64()).unwrap_or(0),
        title: text("title"),
        summary: text("summary"),
        content: text("content"),
        embedding: parse_embedding(row.get("embedding")),
        created_at: created.map(|t| t.timestamp()).unwrap_or(0),
        updated_at: crawled.or(created).map(|t| t.timestamp()).unwrap_or(0),
        metadata,
        url,
    })
}

#[async_trait]
impl Store for SupabaseStore {
    async fn save_page(&self, page: NewPage) -> Result<Page> {
        let metadata = stamp_metadata(page.metadata, &page.url, &page.content, Utc::now());
        let embedding = if page.embedding.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::json!(page.embedding)
        };
        let body = serde_json::json!({
            "url": page.url,
            "chunk_number": page.chunk_number,
            "title": page.title,
            "summary": page.summary,
            "content": page.content,
            "metadata": metadata,
            "embedding": embedding,
        });

        let req = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "url,chunk_number")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body);
        let rows = as_rows(self.send_json(req, "upsert").await?);
        debug!(url = %page.url, chunk = page.chunk_number, "Saved page to Supabase");

        match rows.first() {
            Some(row) => row_to_page(row),
            // return=representation ignored by the server; fall back to what we sent
            None => row_to_page(&body),
        }
    }

    async fn get_page(&self, url: &str, chunk_number: i64) -> Result<Option<Page>> {
        let rows = self
            .select(
                &[
                    ("select", "*".to_string()),
                    ("url", format!("eq.{}", url)),
                    ("chunk_number", format!("eq.{}", chunk_number)),
                    ("limit", "1".to_string()),
                ],
                "select",
            )
            .await?;
        rows.first().map(row_to_page).transpose()
    }

    async fn delete_page(&self, url: &str, chunk_number: Option<i64>) -> Result<u64> {
        let mut params = vec![("url", format!("eq.{}", url))];
        if let Some(n) = chunk_number {
            params.push(("chunk_number", format!("eq.{}", n)));
        }
        let req = self
            .client
            .delete(self.table_url())
            .query(&params)
            .header("Prefer", "return=representation");
        let rows = as_rows(self.send_json(req, "delete").await?);
        Ok(rows.len() as u64)
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        limit: usize,
        threshold: f64,
        filter: &serde_json::Value,
    ) -> Result<Vec<SimilarPage>> {
        let filter = if filter.is_object() {
            filter.clone()
        } else {
            serde_json::json!({})
        };
        let req = self
            .client
            .post(format!(
                "{}/rest/v1/rpc/{}",
                self.base_url, self.match_function
            ))
            .json(&serde_json::json!({
                "query_embedding": query_vec,
                "match_count": limit,
                "filter": filter,
            }));
        let rows = as_rows(self.send_json(req, "match").await?);

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let similarity = row.get("similarity").and_then(|s| s.as_f64()).unwrap_or(0.0);
            scored.push(SimilarPage {
                page: row_to_page(row)?,
                similarity,
            });
        }
        Ok(rank(scored, limit, threshold))
    }

    async fn all_urls(&self) -> Result<Vec<String>> {
        let rows = self
            .select_all(&[("select", "url".to_string())], "select")
            .await?;
        let mut urls: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get("url").and_then(|u| u.as_str()).map(str::to_string))
            .collect();
        urls.sort();
        urls.dedup();
        Ok(urls)
    }

    async fn page_count(&self) -> Result<i64> {
        let req = self
            .client
            .get(self.table_url())
            .query(&[("select", "url"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Supabase count failed ({}): {}", status, body);
        }
        // Content-Range: 0-0/42 or */0
        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|n| n.parse::<i64>().ok());
        match total {
            Some(n) => Ok(n),
            None => bail!("Supabase count response missing Content-Range total"),
        }
    }

    async fn last_crawled(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let rows = self
            .select(
                &[
                    ("select", "metadata".to_string()),
                    ("url", format!("eq.{}", url)),
                ],
                "select",
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| parse_ts(r.get("metadata").and_then(|m| m.get("crawled_at"))))
            .max())
    }

    async fn source_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = self
            .select_all(&[("select", "metadata".to_string())], "select")
            .await?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in &rows {
            let meta = row.get("metadata").cloned().unwrap_or_default();
            *counts.entry(source_of(&meta)).or_default() += 1;
        }
        let mut out: Vec<(String, i64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}
