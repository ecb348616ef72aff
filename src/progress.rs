//! Batch progress reporting.
//!
//! Reports observable progress during `sift batch` so users see how much of
//! a bulk change is done. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use crate::batch::{BatchOptions, BatchProgress};

/// A single progress event for a batch operation.
#[derive(Clone, Debug)]
pub struct BatchProgressEvent {
    /// Operation name, e.g. `status` or `delete`.
    pub operation: String,
    pub processed: u64,
    pub total: u64,
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    /// Emit a progress event. Called once per finished chunk.
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "batch status  1,234 / 5,000 items".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = format!(
            "batch {}  {} / {} items\n",
            event.operation,
            format_number(event.processed),
            format_number(event.total)
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "operation": event.operation,
            "n": event.processed,
            "total": event.total
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Arc<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

/// Route a runner's per-chunk progress to `reporter`.
pub fn attach(
    options: BatchOptions,
    operation: &str,
    reporter: Arc<dyn BatchProgressReporter>,
) -> BatchOptions {
    let operation = operation.to_string();
    options.on_progress(move |p: BatchProgress| {
        reporter.report(BatchProgressEvent {
            operation: operation.clone(),
            processed: p.processed as u64,
            total: p.total as u64,
        })
    })
}
