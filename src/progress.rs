//! Sync progress reporting.
//!
//! `crawlrag sync` reports what each source is doing so long crawls are not
//! silent. Progress goes to **stderr** so stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event for one sync source (`docs`, `github`, `website`, `mcp`).
#[derive(Clone, Debug, PartialEq)]
pub enum SyncProgressEvent {
    /// Listing what to fetch (sitemap, repository tree). Total unknown.
    Discovering { source: String },
    /// `n` of `total` items handled so far.
    Processing { source: String, n: u64, total: u64 },
    /// Source finished with `stored` items written.
    Done { source: String, stored: u64 },
}

/// Reports sync progress. Shared across concurrently running sources.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync docs  processing  12 / 1,204 urls".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Discovering { source } => {
                format!("sync {}  discovering...\n", source)
            }
            SyncProgressEvent::Processing { source, n, total } => format!(
                "sync {}  processing  {} / {} items\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Done { source, stored } => {
                format!("sync {}  done  {} stored\n", source, format_number(*stored))
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "discovering"
            }),
            SyncProgressEvent::Processing { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "processing",
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Done { source, stored } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "done",
                "stored": stored
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
