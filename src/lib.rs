//! # crawlrag
//!
//! Retrieval-augmented generation of crawl4ai scrapers.
//!
//! crawlrag crawls the crawl4ai documentation and GitHub repository into a
//! vector store, then answers "write me a scraper for X" requests by
//! retrieving the closest snippets and asking an LLM for code. It also
//! analyzes arbitrary websites, picks a scraping strategy for their type, and
//! renders a ready-to-run scraper plus optional markdown exports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Sources   │──▶│ Chunk+Title │──▶│    Store     │
//! │ Docs/GitHub │   │   +Embed    │   │ SQLite/Supa  │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ retrieve
//! ┌─────────────┐   ┌─────────────┐   ┌──────▼───────┐
//! │  Analyzer   │──▶│  Strategy   │   │  Generator   │
//! │  (website)  │   │ (templates) │   │  (LLM + RAG) │
//! └─────────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crawlrag init                          # create the SQLite schema
//! crawlrag sync                          # crawl docs + GitHub into the store
//! crawlrag search "arun with a css selector"
//! crawlrag analyze https://docs.example.com -p "Extract API reference pages"
//! crawlrag serve                         # POST /generate_scraper/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`models`] | Core data types |
//! | [`crawler`] / [`html`] | HTTP fetch and HTML → markdown |
//! | [`analyzer`] | Page and site analysis, type detection |
//! | [`strategy`] | Per-type code templates |
//! | [`sources`] | Docs, GitHub and website sync |
//! | [`mcp`] | Subprocess bridge to MCP tool servers |
//! | [`store`] | Pluggable vector store |
//! | [`retrieval`] / [`generator`] | RAG scraper generation |
//! | [`server`] | HTTP API |

pub mod analyzer;
pub mod chunk;
pub mod config;
pub mod crawler;
pub mod db;
pub mod embedding;
pub mod exporter;
pub mod generator;
pub mod html;
pub mod http;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod retrieval;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
pub mod strategy;
pub mod validate;
