//! # crawlrag CLI
//!
//! ## Usage
//!
//! ```bash
//! crawlrag --config ./config/crawlrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crawlrag init` | Create the SQLite schema |
//! | `crawlrag analyze <url>` | Analyze a site and generate a scraper |
//! | `crawlrag sync` | Crawl the docs site and GitHub repo into the store |
//! | `crawlrag sync --url <url>` | Sync a single URL |
//! | `crawlrag detect <url>` | Print the detected website type |
//! | `crawlrag search "<query>"` | Print the snippets retrieval would use |
//! | `crawlrag stats` | Store statistics |
//! | `crawlrag serve` | Start the HTTP API |
//! | `crawlrag mcp call <server> <tool>` | One-shot MCP tool call |
//!
//! ## Examples
//!
//! ```bash
//! crawlrag analyze https://shop.example.com -t ecommerce --output-markdown -o ./out
//! crawlrag sync --force --max-concurrent 10
//! crawlrag mcp call github search_repositories --arg query=repo:unclecode/crawl4ai
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crawlrag::models::WebsiteType;
use crawlrag::pipeline::AnalyzeOptions;
use crawlrag::progress::ProgressMode;
use crawlrag::validate::ScrapingPurpose;
use crawlrag::{analyzer, config, logging, mcp, migrate, pipeline, retrieval, server, sources, stats};

/// crawlrag: retrieval-augmented crawl4ai scraper generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crawlrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "crawlrag",
    about = "crawlrag: analyze websites and generate crawl4ai scrapers from a RAG index",
    version,
    long_about = "crawlrag crawls the crawl4ai documentation and GitHub repository into a vector \
    store, analyzes arbitrary websites to pick a scraping strategy, and generates scraper code \
    from templates or from an LLM grounded in the stored documentation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/crawlrag.toml`. A missing file means built-in
    /// defaults plus environment overrides.
    #[arg(long, global = true, default_value = "./config/crawlrag.toml")]
    config: PathBuf,

    /// Verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the SQLite schema. Idempotent.
    Init,

    /// Analyze a website and generate scraper code and/or markdown.
    Analyze {
        /// URL to analyze.
        url: String,

        /// What the scraper should extract (5-500 characters).
        #[arg(short, long, default_value = "Extract website content")]
        purpose: String,

        /// Website type. Detected from the site when omitted.
        #[arg(short = 't', long = "type", value_enum)]
        website_type: Option<WebsiteType>,

        /// Skip code generation.
        #[arg(long)]
        no_output_code: bool,

        /// Write markdown files for the analyzed pages.
        #[arg(long)]
        output_markdown: bool,

        /// Directory for markdown files (defaults to `[output].markdown_dir`).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum crawl depth (0-5). Defaults to `[crawl].max_depth`.
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum number of URLs to analyze.
        #[arg(short, long)]
        max_urls: Option<usize>,
    },

    /// Sync the crawl4ai docs and GitHub repository, or a single URL.
    Sync {
        /// Sync only this URL.
        #[arg(long)]
        url: Option<String>,

        /// Recrawl pages even if they are fresh.
        #[arg(short, long)]
        force: bool,

        /// Maximum number of concurrent crawls.
        #[arg(short, long)]
        max_concurrent: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Detect the type of a website.
    Detect {
        /// URL to classify.
        url: String,
    },

    /// Print the snippets retrieval returns for a query.
    Search {
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show store statistics.
    Stats,

    /// Start the HTTP API.
    Serve,

    /// Talk to configured MCP servers.
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
}

#[derive(Subcommand)]
enum McpAction {
    /// Call one tool and print the JSON result.
    Call {
        /// Server name from `[mcp.servers.<name>]`.
        server: String,
        /// Tool name.
        tool: String,
        /// Tool arguments as `key=value` pairs. JSON values keep their type.
        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(cfg.log.level.as_deref(), cli.verbose);

    match cli.command {
        Commands::Init => {
            if cfg.store.backend != "sqlite" {
                println!(
                    "Store backend is '{}'; only sqlite needs initialization.",
                    cfg.store.backend
                );
                return Ok(());
            }
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze {
            url,
            purpose,
            website_type,
            no_output_code,
            output_markdown,
            output_dir,
            depth,
            max_urls,
        } => {
            let mut opts = AnalyzeOptions::from_config(&cfg);
            opts.website_type = website_type;
            opts.output_code = !no_output_code;
            opts.output_markdown = output_markdown;
            if let Some(dir) = output_dir {
                opts.output_dir = dir;
            }
            if let Some(n) = max_urls {
                opts.max_urls = n;
            }
            let purpose = ScrapingPurpose::new(purpose, depth.unwrap_or(cfg.crawl.max_depth));
            pipeline::run_analyze(&cfg, &url, &purpose, &opts).await?;
        }
        Commands::Sync {
            url,
            force,
            max_concurrent,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            sources::run_sync(&cfg, url.as_deref(), force, max_concurrent, progress).await?;
        }
        Commands::Detect { url } => {
            analyzer::run_detect(&cfg, &url).await?;
        }
        Commands::Search { query, limit } => {
            retrieval::run_search(&cfg, &query, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Mcp { action } => match action {
            McpAction::Call { server, tool, args } => {
                mcp::run_mcp_call(&cfg, &server, &tool, &args).await?;
            }
        },
    }

    Ok(())
}
