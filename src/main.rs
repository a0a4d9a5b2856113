//! # logshard CLI
//!
//! Reads a free-form `key=value` log, writes one JSON-lines shard per
//! distinct field schema plus a manifest, then rebuilds one table per shard
//! in a local DuckDB file and/or a MotherDuck database.
//!
//! ## Usage
//!
//! ```bash
//! logshard --log-file ./logs/operations.log [options]
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Shards only, next to the log in ./logs/operations_structured/
//! logshard --log-file ./logs/operations.log --skip-motherduck
//!
//! # Shards plus local DuckDB tables operations_schema_01, _02, ...
//! logshard --log-file ./logs/operations.log --duckdb ./data/ops.duckdb
//!
//! # Also push to MotherDuck (token from MOTHERDUCK_TOKEN)
//! logshard --log-file ./logs/operations.log --duckdb ./data/ops.duckdb --motherduck-db analytics
//!
//! # Inspect the schemas without writing anything
//! logshard --log-file ./logs/operations.log --dry-run
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use logshard::config;
use logshard::ingest::{self, RunOptions};
use logshard::progress::ProgressMode;
use logshard::signal::{cancel_on_ctrl_c, CancelFlag};

/// Parse log files into schema-specific JSONL files and load databases.
#[derive(Parser, Debug)]
#[command(
    name = "logshard",
    version,
    about = "Parse log files into schema-specific JSONL files and load DuckDB / MotherDuck",
    long_about = "Every distinct ordered set of fields in the log becomes its own JSON-lines \
    shard and its own table. Tables are dropped and rebuilt on every run, in manifest order."
)]
struct Cli {
    /// Path to the log file to ingest.
    #[arg(long)]
    log_file: PathBuf,

    /// Directory to write schema JSONL files (defaults to <log-dir>/<log-stem>_structured).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Path to the DuckDB database (omit to skip DuckDB loading).
    #[arg(long)]
    duckdb: Option<PathBuf>,

    /// Prefix used for generated table and file names (defaults to the log file stem).
    #[arg(long)]
    table_prefix: Option<String>,

    /// MotherDuck database name (default: env OPERATIONS_MOTHERDUCK_DB or DATABASE_NAME).
    #[arg(long)]
    motherduck_db: Option<String>,

    /// Skip loading data into DuckDB even if --duckdb is provided.
    #[arg(long)]
    skip_duckdb: bool,

    /// Skip loading data into MotherDuck.
    #[arg(long)]
    skip_motherduck: bool,

    /// Optional TOML file with sync timeouts, retries, and remote settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse and classify only; print the schemas without writing files or tables.
    #[arg(long)]
    dry_run: bool,

    /// Sync progress on stderr (default: human on a TTY, otherwise off).
    #[arg(long, value_enum)]
    progress: Option<ProgressMode>,

    /// Log filter (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_or_default(cli.config.as_deref())?;

    let log_file = cli.log_file;
    let table_prefix = config::resolve_table_prefix(cli.table_prefix.as_deref(), &log_file)
        .context("Invalid --table-prefix")?;
    let output_dir = cli
        .output_dir
        .unwrap_or_else(|| config::default_output_dir(&log_file));
    let motherduck_db = config::resolve_remote_database(
        cli.motherduck_db.as_deref(),
        &cfg.remote,
        |name| std::env::var(name).ok(),
    );
    let motherduck_token = std::env::var(&cfg.remote.token_env).ok();

    let opts = RunOptions {
        log_file,
        output_dir,
        table_prefix,
        duckdb: cli.duckdb,
        skip_duckdb: cli.skip_duckdb,
        motherduck_db,
        motherduck_token,
        skip_motherduck: cli.skip_motherduck,
        dry_run: cli.dry_run,
    };

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());

    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    ingest::run_ingest(&cfg, &opts, &cancel, progress.as_ref()).await
}
