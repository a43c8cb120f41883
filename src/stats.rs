//! Store statistics.
//!
//! A quick summary of what has been synced: row count, distinct URLs, and a
//! per-source breakdown keyed on `metadata.source`. Used by `crawlrag stats`
//! to confirm that syncs are writing what they should.

use anyhow::Result;

use crate::config::Config;
use crate::store::{open_store, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub pages: i64,
    pub urls: usize,
    pub by_source: Vec<(String, i64)>,
}

pub async fn collect_stats(store: &dyn Store) -> Result<StoreStats> {
    Ok(StoreStats {
        pages: store.page_count().await?,
        urls: store.all_urls().await?.len(),
        by_source: store.source_counts().await?,
    })
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = collect_stats(store.as_ref()).await?;

    println!("crawlrag store stats");
    println!("====================");
    println!();
    println!("  Backend:     {}", config.store.backend);
    if config.store.backend == "sqlite" {
        let db_size = std::fs::metadata(&config.db.path)
            .map(|m| m.len())
            .unwrap_or(0);
        println!("  Database:    {}", config.db.path.display());
        println!("  Size:        {}", format_bytes(db_size));
    }
    println!();
    println!("  Pages:       {}", stats.pages);
    println!("  URLs:        {}", stats.urls);

    if !stats.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>8} {:>8}", "SOURCE", "PAGES", "SHARE");
        println!("  {}", "-".repeat(44));
        for (source, count) in &stats.by_source {
            println!(
                "  {:<24} {:>8} {:>7}%",
                source,
                count,
                percent(*count, stats.pages)
            );
        }
    }

    println!();
    Ok(())
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        (part * 100) / total
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
