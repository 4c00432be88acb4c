//! Build progress reporting.
//!
//! Reports observable progress during `visa build` so users see how many
//! rules have been embedded and how many batches remain. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.
//!
//! The reporters implement `visa_assist_core::index::BuildProgressReporter`;
//! the builder itself never decides where events go.

use std::io::Write;

use visa_assist_core::index::{BuildProgressEvent, BuildProgressReporter, NoProgress};

/// Human-friendly progress on stderr: "build  batch 3 / 40  192 / 2,500 rules".
pub struct StderrProgress;

impl StderrProgress {
    fn render(event: &BuildProgressEvent) -> String {
        match event {
            BuildProgressEvent::Started { total, batches } => format!(
                "build  embedding {} rules in {} batches\n",
                format_number(*total as u64),
                format_number(*batches as u64)
            ),
            BuildProgressEvent::Batch {
                batch,
                batches,
                rows_done,
                total,
            } => format!(
                "build  batch {} / {}  {} / {} rules\n",
                batch,
                batches,
                format_number(*rows_done as u64),
                format_number(*total as u64)
            ),
            BuildProgressEvent::Finished { documents } => format!(
                "build  done  {} documents\n",
                format_number(*documents as u64)
            ),
        }
    }
}

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = Self::render(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn render(event: &BuildProgressEvent) -> serde_json::Value {
        match event {
            BuildProgressEvent::Started { total, batches } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total,
                "batches": batches
            }),
            BuildProgressEvent::Batch {
                batch,
                batches,
                rows_done,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "batch": batch,
                "batches": batches,
                "n": rows_done,
                "total": total
            }),
            BuildProgressEvent::Finished { documents } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "documents": documents
            }),
        }
    }
}

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::render(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
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
    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
