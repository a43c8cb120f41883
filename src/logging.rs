//! Tracing subscriber setup.
//!
//! Filter precedence: `RUST_LOG` > `LOG_LEVEL` (or `[log] level`) >
//! `--verbose` > `info`. HTTP and database crates are held at `warn` so a
//! debug run shows crawl activity rather than connection chatter.
//!
//! Logs go to stderr; command output stays on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const QUIET_CRATES: &str = "hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn,sqlx=warn,html5ever=warn,selectors=warn";

/// Build the filter directive string from the available sources.
pub fn filter_directive(rust_log: Option<&str>, log_level: Option<&str>, verbose: bool) -> String {
    if let Some(directive) = rust_log.filter(|s| !s.trim().is_empty()) {
        return directive.to_string();
    }
    let base = match log_level.map(|l| l.trim().to_ascii_lowercase()) {
        Some(level) if !level.is_empty() => match level.as_str() {
            // Python-style names are accepted too
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            _ => level,
        },
        _ if verbose => "debug".to_string(),
        _ => "info".to_string(),
    };
    format!("{},{}", base, QUIET_CRATES)
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(log_level: Option<&str>, verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), log_level, verbose);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let _ = tracing_subscriber::registry().with(layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins() {
        assert_eq!(
            filter_directive(Some("crawlrag=trace"), Some("error"), true),
            "crawlrag=trace"
        );
    }

    #[test]
    fn test_log_level_over_verbose() {
        let d = filter_directive(None, Some("WARNING"), true);
        assert!(d.starts_with("warn,"));
        assert!(d.contains("sqlx=warn"));
    }

    #[test]
    fn test_verbose_and_default() {
        assert!(filter_directive(None, None, true).starts_with("debug,"));
        assert!(filter_directive(None, None, false).starts_with("info,"));
        assert!(filter_directive(Some(""), Some(" "), false).starts_with("info,"));
    }
}
