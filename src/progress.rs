//! Store sync progress reporting.
//!
//! Reports observable progress while tables are rebuilt, so users can see
//! which destination is being loaded and how many tables are left.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a store sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Opening the destination connection.
    Connecting { destination: String },
    /// Table `n` of `total` is being rebuilt.
    Loading {
        destination: String,
        table: String,
        n: u64,
        total: u64,
    },
    /// A table finished loading.
    Loaded {
        destination: String,
        table: String,
        rows: u64,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the sync loop.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync DuckDB  loading  ops_schema_02  2 / 5 tables".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Connecting { destination } => {
                format!("sync {}  connecting...\n", destination)
            }
            SyncProgressEvent::Loading {
                destination,
                table,
                n,
                total,
            } => format!(
                "sync {}  loading  {}  {} / {} tables\n",
                destination,
                table,
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Loaded {
                destination,
                table,
                rows,
            } => format!(
                "sync {}  loaded  {}  {} rows\n",
                destination,
                table,
                format_number(*rows)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Connecting { destination } => serde_json::json!({
                "event": "progress",
                "destination": destination,
                "phase": "connecting"
            }),
            SyncProgressEvent::Loading {
                destination,
                table,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "destination": destination,
                "phase": "loading",
                "table": table,
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Loaded {
                destination,
                table,
                rows,
            } => serde_json::json!({
                "event": "progress",
                "destination": destination,
                "phase": "loaded",
                "table": table,
                "rows": rows
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
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
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
