//! Ingestion pipeline orchestration.
//!
//! Coordinates the full run: read log → parse → classify → write shards →
//! local sync → remote sync. The two sync stages are isolated: a failure in
//! one is reported and the other is still attempted.

use anyhow::{bail, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::classify::SchemaGroups;
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::ManifestEntry;
use crate::parse::parse_line;
use crate::progress::SyncProgressReporter;
use crate::shard::write_shards;
use crate::signal::CancelFlag;
use crate::store::local::sync_local;
use crate::store::remote::sync_remote;
use crate::store::{SyncJob, SyncOutcome};

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub log_file: PathBuf,
    pub output_dir: PathBuf,
    pub table_prefix: String,
    pub duckdb: Option<PathBuf>,
    pub skip_duckdb: bool,
    pub motherduck_db: Option<String>,
    pub motherduck_token: Option<String>,
    pub skip_motherduck: bool,
    pub dry_run: bool,
}

/// Counters from reading the log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineStats {
    pub lines_read: usize,
    pub records_parsed: usize,
    pub lines_skipped: usize,
}

/// Parse every line of `path` and group the records by schema.
///
/// Lines that are not valid UTF-8 are decoded lossily rather than failing
/// the run; lines too short to parse are counted and dropped.
pub fn read_log(path: &Path) -> crate::error::Result<(SchemaGroups, LineStats)> {
    if !path.is_file() {
        return Err(PipelineError::InputMissing(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut groups = SchemaGroups::new();
    let mut stats = LineStats::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| PipelineError::io(path, e))?;
        if n == 0 {
            break;
        }
        stats.lines_read += 1;

        let line = String::from_utf8_lossy(&buf);
        match parse_line(&line) {
            Some(record) => {
                stats.records_parsed += 1;
                groups.push(record);
            }
            None => stats.lines_skipped += 1,
        }
    }

    Ok((groups, stats))
}

/// Run the whole pipeline and print a summary on stdout.
pub async fn run_ingest(
    config: &Config,
    opts: &RunOptions,
    cancel: &CancelFlag,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let (groups, stats) = read_log(&opts.log_file)?;
    tracing::info!(schemas = groups.len(), "discovered unique schema(s)");

    if opts.dry_run {
        println!("ingest {} (dry-run)", opts.log_file.display());
        print_stats(&stats, groups.len());
        for (i, (key, records)) in groups.sorted().into_iter().enumerate() {
            println!(
                "  {}_schema_{:02}: {} row(s), {} column(s)",
                opts.table_prefix,
                i + 1,
                records.len(),
                key.len()
            );
        }
        return Ok(());
    }

    let manifest = write_shards(&groups, &opts.output_dir, &opts.table_prefix)?;

    println!("ingest {}", opts.log_file.display());
    print_stats(&stats, groups.len());
    print_manifest(&manifest);

    let sync_options = config.sync.options();
    let job = SyncJob {
        manifest: &manifest,
        shard_dir: &opts.output_dir,
        table_prefix: &opts.table_prefix,
        options: &sync_options,
        cancel,
        progress,
    };

    let mut failures = Vec::new();
    for outcome in sync_stages(opts, &job).await {
        report_outcome(outcome, &mut failures);
    }

    if !failures.is_empty() {
        bail!(
            "{} sync stage(s) failed; shard files and manifest were kept in {}",
            failures.len(),
            opts.output_dir.display()
        );
    }

    println!("ok");
    Ok(())
}

/// Run the local stage, then the remote stage.
///
/// The remote stage is attempted whatever the local stage returned.
pub async fn sync_stages(
    opts: &RunOptions,
    job: &SyncJob<'_>,
) -> Vec<crate::error::Result<SyncOutcome>> {
    let local = sync_local(opts.duckdb.as_deref(), opts.skip_duckdb, job).await;
    let remote = sync_remote(
        opts.motherduck_token.clone(),
        opts.motherduck_db.clone(),
        opts.skip_motherduck,
        job,
    )
    .await;
    vec![local, remote]
}

fn print_stats(stats: &LineStats, schemas: usize) {
    println!("  lines read: {}", stats.lines_read);
    println!("  records parsed: {}", stats.records_parsed);
    println!("  lines skipped: {}", stats.lines_skipped);
    println!("  schemas: {}", schemas);
}

fn print_manifest(manifest: &[ManifestEntry]) {
    for entry in manifest {
        println!(
            "  {}: {} row(s), {} column(s)",
            entry.filename,
            entry.row_count,
            entry.columns.len()
        );
    }
}

fn report_outcome(
    outcome: crate::error::Result<SyncOutcome>,
    failures: &mut Vec<PipelineError>,
) {
    match outcome {
        Ok(SyncOutcome::Loaded(report)) => {
            for table in &report.tables {
                println!(
                    "  {}: {} {} row(s) loaded",
                    report.destination, table.table_name, table.row_count
                );
            }
        }
        Ok(SyncOutcome::Skipped {
            destination,
            reason,
        }) => {
            println!("  {}: skipped ({})", destination, reason);
        }
        Err(e) => {
            tracing::error!(error = %e, "sync stage failed");
            failures.push(e);
        }
    }
}
