//! In-memory [`Store`] implementation for tests and scratch runs.
//!
//! Rows live in a `BTreeMap` keyed by `(url, chunk_number)` behind a
//! `std::sync::RwLock`. Vector search is brute-force cosine similarity.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::embedding::cosine_similarity;
use crate::models::{NewPage, Page, SimilarPage};

use super::{metadata_matches, rank, source_of, stamp_metadata, Store};

type Key = (String, i64);

pub struct MemoryStore {
    pages: RwLock<BTreeMap<Key, Page>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Key, Page>>> {
        self.pages
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Key, Page>>> {
        self.pages
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_page(&self, page: NewPage) -> Result<Page> {
        let now = Utc::now();
        let metadata = stamp_metadata(page.metadata, &page.url, &page.content, now);
        let key = (page.url.clone(), page.chunk_number);

        let mut pages = self.write()?;
        let created_at = pages
            .get(&key)
            .map(|p| p.created_at)
            .unwrap_or_else(|| now.timestamp());
        let stored = Page {
            url: page.url,
            chunk_number: page.chunk_number,
            title: page.title,
            summary: page.summary,
            content: page.content,
            metadata,
            embedding: page.embedding,
            created_at,
            updated_at: now.timestamp(),
        };
        pages.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_page(&self, url: &str, chunk_number: i64) -> Result<Option<Page>> {
        Ok(self.read()?.get(&(url.to_string(), chunk_number)).cloned())
    }

    async fn delete_page(&self, url: &str, chunk_number: Option<i64>) -> Result<u64> {
        let mut pages = self.write()?;
        let before = pages.len();
        pages.retain(|(u, n), _| !(u == url && chunk_number.map_or(true, |c| c == *n)));
        Ok((before - pages.len()) as u64)
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        limit: usize,
        threshold: f64,
        filter: &serde_json::Value,
    ) -> Result<Vec<SimilarPage>> {
        let scored = self
            .read()?
            .values()
            .filter(|p| p.embedding.len() == query_vec.len() && !p.embedding.is_empty())
            .filter(|p| metadata_matches(&p.metadata, filter))
            .map(|p| SimilarPage {
                page: p.clone(),
                similarity: cosine_similarity(query_vec, &p.embedding) as f64,
            })
            .collect();
        Ok(rank(scored, limit, threshold))
    }

    async fn all_urls(&self) -> Result<Vec<String>> {
        let mut urls: Vec<String> = self.read()?.keys().map(|(u, _)| u.clone()).collect();
        urls.dedup();
        Ok(urls)
    }

    async fn page_count(&self) -> Result<i64> {
        Ok(self.read()?.len() as i64)
    }

    async fn last_crawled(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .read()?
            .values()
            .filter(|p| p.url == url)
            .map(|p| p.updated_at)
            .max()
            .and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    async fn source_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for page in self.read()?.values() {
            *counts.entry(source_of(&page.metadata)).or_default() += 1;
        }
        let mut out: Vec<(String, i64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}
