//! Indexing progress reporting.
//!
//! Reports observable progress during `newsdesk index` so users see how
//! many articles are left. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use crate::models::RecordOutcome;

/// A single progress event for an indexing run.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Articles were loaded from the store; processing starts.
    Loaded { total: u64 },
    /// `n` of `total` records processed; `outcome` is the latest one.
    Processed {
        n: u64,
        total: u64,
        outcome: RecordOutcome,
    },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the indexer once per record.
    fn report(&self, event: IndexProgressEvent);
}

fn outcome_label(outcome: &RecordOutcome) -> &'static str {
    match outcome {
        RecordOutcome::Updated { .. } => "updated",
        RecordOutcome::Skipped { .. } => "skipped",
        RecordOutcome::Rejected { .. } => "rejected",
        RecordOutcome::Failed { .. } => "failed",
    }
}

/// Human-friendly progress on stderr: "index  1,234 / 5,000 articles".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Loaded { total } => {
                format!("index  {} articles loaded\n", format_number(*total))
            }
            IndexProgressEvent::Processed { n, total, .. } => {
                format!(
                    "\rindex  {} / {} articles{}",
                    format_number(*n),
                    format_number(*total),
                    if n == total { "\n" } else { "" }
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Loaded { total } => serde_json::json!({
                "event": "progress",
                "phase": "loaded",
                "total": total
            }),
            IndexProgressEvent::Processed { n, total, outcome } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n,
                "total": total,
                "outcome": outcome_label(outcome)
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
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
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Auto if atty::is(atty::Stream::Stderr) => Box::new(StderrProgress),
            ProgressMode::Auto | ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
