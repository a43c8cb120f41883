//! TOML configuration with environment overrides.
//!
//! The file at `--config` supplies non-secret settings. Secrets (API keys,
//! the Supabase endpoint, the GitHub token) are read from the process
//! environment, which also overrides a handful of tunables so the tool can be
//! driven from a shell without editing the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `SUPABASE_URL`, `SUPABASE_KEY` | `[store]` Supabase endpoint and key |
//! | `OPENAI_API_KEY` | key for `[embedding]` and `[llm]` |
//! | `EMBEDDING_MODEL` | `embedding.model` |
//! | `LLM_MODEL` | `llm.model` |
//! | `MAX_CRAWL_DEPTH` | `crawl.max_depth` |
//! | `MAX_CONCURRENT_CRAWLS` | `crawl.max_concurrent` |
//! | `DEFAULT_MARKDOWN_OUTPUT_DIR` | `output.markdown_dir` |
//! | `LOG_LEVEL` | `log.level` |
//! | `GITHUB_TOKEN` | `sources.github_token` |
//! | `GITHUB_REPO` | `sources.github_repo` |
//! | `DOCS_URL` | `sources.docs_url` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/crawlrag.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_match_function")]
    pub match_function: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Populated from `SUPABASE_URL`.
    #[serde(skip)]
    pub supabase_url: Option<String>,
    /// Populated from `SUPABASE_KEY`.
    #[serde(skip)]
    pub supabase_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            table: default_table(),
            match_function: default_match_function(),
            max_age_days: default_max_age_days(),
            supabase_url: None,
            supabase_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_table() -> String {
    "site_pages".to_string()
}
fn default_match_function() -> String {
    "match_site_pages".to_string()
}
fn default_max_age_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_base")]
    pub base_url: String,
    /// Populated from `OPENAI_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: default_openai_base(),
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_base")]
    pub base_url: String,
    /// Populated from `OPENAI_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            base_url: default_openai_base(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.2
}
fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default)]
    pub threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: default_match_count(),
            threshold: 0.0,
        }
    }
}

fn default_match_count() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_concurrent: default_max_concurrent(),
            max_urls: default_max_urls(),
            chunk_size: default_chunk_size(),
            request_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_depth() -> u32 {
    2
}
fn default_max_concurrent() -> usize {
    5
}
fn default_max_urls() -> usize {
    10
}
fn default_chunk_size() -> usize {
    5000
}
fn default_user_agent() -> String {
    format!("crawlrag/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_github_repo")]
    pub github_repo: String,
    #[serde(default = "default_branch")]
    pub github_branch: String,
    #[serde(default = "default_github_max_depth")]
    pub github_max_depth: u32,
    #[serde(default = "default_github_api")]
    pub github_api_url: String,
    /// Populated from `GITHUB_TOKEN`.
    #[serde(skip)]
    pub github_token: Option<String>,
    #[serde(default = "default_docs_url")]
    pub docs_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            github_repo: default_github_repo(),
            github_branch: default_branch(),
            github_max_depth: default_github_max_depth(),
            github_api_url: default_github_api(),
            github_token: None,
            docs_url: default_docs_url(),
        }
    }
}

fn default_github_repo() -> String {
    "unclecode/crawl4ai".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_github_max_depth() -> u32 {
    3
}
fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_docs_url() -> String {
    "https://docs.crawl4ai.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_markdown_dir")]
    pub markdown_dir: PathBuf,
    #[serde(default = "default_code_file")]
    pub code_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            markdown_dir: default_markdown_dir(),
            code_file: default_code_file(),
        }
    }
}

fn default_markdown_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_code_file() -> PathBuf {
    PathBuf::from("scraper.py")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// `[mcp]` section: bridge timeouts plus named server commands.
///
/// ```toml
/// [mcp]
/// timeout_secs = 30
///
/// [mcp.servers.github]
/// command = "npx"
/// args = ["-y", "@modelcontextprotocol/server-github"]
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct McpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_mcp_retries")]
    pub retries: u32,
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_mcp_retries(),
            servers: HashMap::new(),
        }
    }
}

fn default_mcp_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
}

impl Config {
    /// Defaults for every section, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load the config file (or defaults if it does not exist), apply
/// environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.as_os_str().is_empty() || !path.exists() {
        Config::minimal()
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Overlay environment values onto `config`. `lookup` is injected so tests
/// don't have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("SUPABASE_URL") {
        config.store.supabase_url = Some(v);
    }
    if let Some(v) = get("SUPABASE_KEY") {
        config.store.supabase_key = Some(v);
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.embedding.api_key = Some(v.clone());
        config.llm.api_key = Some(v);
    }
    if let Some(v) = get("EMBEDDING_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = get("LLM_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = get("MAX_CRAWL_DEPTH") {
        config.crawl.max_depth = v
            .parse()
            .with_context(|| format!("MAX_CRAWL_DEPTH must be an integer, got '{}'", v))?;
    }
    if let Some(v) = get("MAX_CONCURRENT_CRAWLS") {
        config.crawl.max_concurrent = v
            .parse()
            .with_context(|| format!("MAX_CONCURRENT_CRAWLS must be an integer, got '{}'", v))?;
    }
    if let Some(v) = get("DEFAULT_MARKDOWN_OUTPUT_DIR") {
        config.output.markdown_dir = PathBuf::from(v);
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.log.level = Some(v);
    }
    if let Some(v) = get("GITHUB_TOKEN") {
        config.sources.github_token = Some(v);
    }
    if let Some(v) = get("GITHUB_REPO") {
        config.sources.github_repo = v;
    }
    if let Some(v) = get("DOCS_URL") {
        config.sources.docs_url = v;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    if config.crawl.chunk_size == 0 {
        bail!("crawl.chunk_size must be > 0");
    }
    if config.crawl.max_concurrent == 0 {
        bail!("crawl.max_concurrent must be > 0");
    }
    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        bail!("retrieval.threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.match_count == 0 {
        bail!("retrieval.match_count must be >= 1");
    }

    match config.store.backend.as_str() {
        "sqlite" | "supabase" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite, supabase, or memory.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::minimal();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.store.backend, "sqlite");
        assert_eq!(cfg.store.max_age_days, 7);
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.crawl.chunk_size, 5000);
        assert_eq!(cfg.sources.github_repo, "unclecode/crawl4ai");
    }

    #[test]
    fn test_parse_partial_file() {
        let cfg: Config = toml::from_str(
            r#"
[store]
backend = "supabase"

[embedding]
provider = "openai"
dims = 8

[mcp.servers.github]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-github"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.store.backend, "supabase");
        assert_eq!(cfg.store.table, "site_pages");
        assert_eq!(cfg.embedding.dims, 8);
        assert_eq!(cfg.embedding.batch_size, 64);
        assert_eq!(cfg.mcp.servers["github"].command, "npx");
        assert_eq!(cfg.mcp.servers["github"].args.len(), 2);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::minimal();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("SUPABASE_URL", "https://x.supabase.co"),
                ("SUPABASE_KEY", "secret"),
                ("OPENAI_API_KEY", "sk-test"),
                ("LLM_MODEL", "gpt-4"),
                ("MAX_CONCURRENT_CRAWLS", "9"),
                ("GITHUB_REPO", "owner/repo"),
                ("LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.store.supabase_url.as_deref(), Some("https://x.supabase.co"));
        assert_eq!(cfg.store.supabase_key.as_deref(), Some("secret"));
        assert_eq!(cfg.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.llm.model, "gpt-4");
        assert_eq!(cfg.crawl.max_concurrent, 9);
        assert_eq!(cfg.sources.github_repo, "owner/repo");
        assert_eq!(cfg.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_secrets_in_file_are_ignored() {
        let cfg: Config = toml::from_str(
            r#"
[store]
backend = "supabase"
supabase_url = "https://file.supabase.co"
supabase_key = "from-file"

[embedding]
provider = "openai"
api_key = "sk-file"

[llm]
provider = "openai"
api_key = "sk-file"

[sources]
github_token = "ghp_file"
"#,
        )
        .unwrap();
        assert!(cfg.store.supabase_url.is_none());
        assert!(cfg.store.supabase_key.is_none());
        assert!(cfg.embedding.api_key.is_none());
        assert!(cfg.llm.api_key.is_none());
        assert!(cfg.sources.github_token.is_none());
    }

    #[test]
    fn test_env_blank_values_ignored() {
        let mut cfg = Config::minimal();
        apply_env_overrides(&mut cfg, env(&[("LLM_MODEL", "  ")])).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_env_bad_integer() {
        let mut cfg = Config::minimal();
        let err = apply_env_overrides(&mut cfg, env(&[("MAX_CRAWL_DEPTH", "deep")])).unwrap_err();
        assert!(err.to_string().contains("MAX_CRAWL_DEPTH"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let mut cfg = Config::minimal();
        cfg.store.backend = "redis".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut cfg = Config::minimal();
        cfg.retrieval.threshold = 1.5;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = load_config(Path::new("/nonexistent/crawlrag.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }
}
