//! Store sync: rebuild one analytical table per schema shard.
//!
//! Both destinations (a local DuckDB file and a hosted MotherDuck database)
//! speak DuckDB SQL, so they differ only in how a connection is opened and
//! which errors are worth retrying. That difference is the
//! [`StoreDriver`] trait; the load loop, failure policy, and row-count
//! reporting live once in [`sync_manifest`].
//!
//! # Contract
//!
//! 1. Open one connection (closed when the sync returns, on every path).
//! 2. Drop the legacy umbrella table named exactly `table_prefix`.
//! 3. For each manifest entry, in order: drop the table, recreate it from
//!    the shard with `read_json_auto`, count its rows.
//! 4. The first failing table aborts the rest of this destination. Tables
//!    for earlier entries stay in place; later ones are not touched.

pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duckdb::Connection;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::ident::{quote_literal, TableIdent};
use crate::models::ManifestEntry;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::signal::CancelFlag;

/// A destination that can hand out DuckDB connections.
pub trait StoreDriver: Send + Sync + 'static {
    /// Human-readable destination label used in logs and errors.
    fn destination(&self) -> &'static str;

    /// Open a fresh connection. Blocking.
    fn connect(&self) -> duckdb::Result<Connection>;

    /// Whether a failure is worth retrying (network hiccups and the like).
    fn is_transient(&self, _err: &duckdb::Error) -> bool {
        false
    }
}

/// Timeout and retry settings for one sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub table_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            table_timeout: Duration::from_secs(300),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl SyncOptions {
    /// Delay before retry `attempt` (1-based): base, 2×base, 4×base, … capped at 32×.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(5))
    }
}

/// Everything a sync needs besides the driver.
pub struct SyncJob<'a> {
    pub manifest: &'a [ManifestEntry],
    pub shard_dir: &'a Path,
    pub table_prefix: &'a str,
    pub options: &'a SyncOptions,
    pub cancel: &'a CancelFlag,
    pub progress: &'a dyn SyncProgressReporter,
}

/// Rows loaded into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub table_name: String,
    pub row_count: u64,
}

/// Result of a completed sync against one destination.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub destination: &'static str,
    pub tables: Vec<TableLoad>,
}

/// What a sync stage did.
#[derive(Debug)]
pub enum SyncOutcome {
    Loaded(SyncReport),
    Skipped {
        destination: &'static str,
        reason: String,
    },
}

/// One open connection plus the handle that can interrupt its running query.
struct SharedConn {
    conn: Arc<Mutex<Connection>>,
    interrupt: Box<dyn Fn() + Send + Sync>,
}

impl SharedConn {
    fn new(conn: Connection) -> Self {
        let handle = conn.interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt: Box::new(move || handle.interrupt()),
        }
    }
}

/// Rebuild every manifest table in `driver`'s destination.
pub async fn sync_manifest(driver: Arc<dyn StoreDriver>, job: &SyncJob<'_>) -> Result<SyncReport> {
    let destination = driver.destination();

    // Identifiers are checked before anything touches the destination.
    let umbrella = TableIdent::new(job.table_prefix)?;
    let idents = job
        .manifest
        .iter()
        .map(|entry| TableIdent::new(&entry.table_name))
        .collect::<Result<Vec<_>>>()?;

    job.progress.report(SyncProgressEvent::Connecting {
        destination: destination.to_string(),
    });
    let conn = connect_with_retry(&driver, job.options).await?;

    let drop_umbrella = format!("DROP TABLE IF EXISTS {}", umbrella.quoted());
    run_blocking(&conn, destination, job.table_prefix, job.options.table_timeout, move |c| {
        c.execute_batch(&drop_umbrella)
    })
    .await?;
    debug!(destination, table = job.table_prefix, "dropped umbrella table");

    let total = job.manifest.len() as u64;
    let mut tables = Vec::with_capacity(job.manifest.len());
    for (i, (entry, ident)) in job.manifest.iter().zip(idents).enumerate() {
        if job.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                destination,
                completed: tables.len(),
            });
        }

        job.progress.report(SyncProgressEvent::Loading {
            destination: destination.to_string(),
            table: entry.table_name.clone(),
            n: i as u64 + 1,
            total,
        });

        let file = job.shard_dir.join(&entry.filename);
        let rows = load_with_retry(&driver, &conn, ident, &file, job.options).await?;

        if rows != entry.row_count as u64 {
            warn!(
                destination,
                table = %entry.table_name,
                loaded = rows,
                expected = entry.row_count,
                "row count differs from manifest"
            );
        }
        info!(destination, table = %entry.table_name, rows, "table loaded");
        job.progress.report(SyncProgressEvent::Loaded {
            destination: destination.to_string(),
            table: entry.table_name.clone(),
            rows,
        });

        tables.push(TableLoad {
            table_name: entry.table_name.clone(),
            row_count: rows,
        });
    }

    Ok(SyncReport {
        destination,
        tables,
    })
}

/// Drop `table`, recreate it from a JSON-lines file, and return its row count.
///
/// After the drop step the table is absent, so re-running this for the same
/// shard always converges on the same table.
pub fn apply_shard(conn: &Connection, table: &TableIdent, file: &Path) -> duckdb::Result<u64> {
    let table = table.quoted();
    let source = quote_literal(&file.to_string_lossy());

    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
    conn.execute_batch(&format!(
        "CREATE TABLE {} AS SELECT * FROM read_json_auto({}, format = 'newline_delimited')",
        table, source
    ))?;
    let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(rows.max(0) as u64)
}

async fn connect_with_retry(driver: &Arc<dyn StoreDriver>, options: &SyncOptions) -> Result<SharedConn> {
    let destination = driver.destination();
    let mut attempt = 0u32;
    loop {
        let factory = Arc::clone(driver);
        let opened = tokio::task::spawn_blocking(move || factory.connect())
            .await
            .map_err(|e| PipelineError::Task {
                destination,
                message: e.to_string(),
            })?;

        match opened {
            Ok(conn) => return Ok(SharedConn::new(conn)),
            Err(e) if attempt < options.max_retries && driver.is_transient(&e) => {
                attempt += 1;
                let delay = options.backoff(attempt);
                warn!(destination, attempt, ?delay, error = %e, "connect failed; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(PipelineError::Connect {
                    destination,
                    source,
                })
            }
        }
    }
}

async fn load_with_retry(
    driver: &Arc<dyn StoreDriver>,
    conn: &SharedConn,
    table: TableIdent,
    file: &Path,
    options: &SyncOptions,
) -> Result<u64> {
    let destination = driver.destination();
    let mut attempt = 0u32;
    loop {
        let ident = table.clone();
        let path: PathBuf = file.to_path_buf();
        let result = run_blocking(conn, destination, table.as_str(), options.table_timeout, move |c| {
            apply_shard(c, &ident, &path)
        })
        .await;

        match result {
            Err(PipelineError::Load { source, .. })
                if attempt < options.max_retries && driver.is_transient(&source) =>
            {
                attempt += 1;
                let delay = options.backoff(attempt);
                warn!(destination, table = %table, attempt, ?delay, error = %source, "load failed; retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Run `f` against the shared connection on the blocking pool, bounded by `limit`.
///
/// On timeout the running query is interrupted and the blocking task is
/// awaited before the error is returned, so nothing keeps writing to the
/// destination after the table is reported as failed.
async fn run_blocking<T, F>(
    conn: &SharedConn,
    destination: &'static str,
    table: &str,
    limit: Duration,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> duckdb::Result<T> + Send + 'static,
{
    let handle = Arc::clone(&conn.conn);
    let mut task = tokio::task::spawn_blocking(move || {
        let guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    });

    let joined = match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(destination, table, ?limit, "load timed out; interrupting");
            (conn.interrupt)();
            if let Err(join) = task.await {
                warn!(destination, table, error = %join, "interrupted load task failed");
            }
            return Err(PipelineError::Timeout {
                destination,
                table: table.to_string(),
                limit,
            });
        }
    };

    match joined {
        Err(join) => Err(PipelineError::Task {
            destination,
            message: join.to_string(),
        }),
        Ok(Err(source)) => Err(PipelineError::Load {
            destination,
            table: table.to_string(),
            source,
        }),
        Ok(Ok(value)) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::parse::parse_line;
    use crate::progress::NoProgress;
    use crate::shard::write_shards;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const LOG: &str = "\
2024-03-01 12:00:01 INFO api request user=alice status=200
2024-03-01 12:00:02 INFO api request user=bob status=500
2024-03-01 12:00:03 WARN db query table=users rows=3 elapsed=0.25
2024-03-01 12:00:04 ALERT storage check disk=sda1 issue=Disk nearly full (severity: critical).
";

    /// File-backed driver with an optional injected failure.
    struct TestDriver {
        path: PathBuf,
        connects: AtomicU32,
        transient_connect_failures: u32,
    }

    impl TestDriver {
        fn new(path: PathBuf) -> Self {
            Self {
                path,
                connects: AtomicU32::new(0),
                transient_connect_failures: 0,
            }
        }
    }

    impl StoreDriver for TestDriver {
        fn destination(&self) -> &'static str {
            "test"
        }

        fn connect(&self) -> duckdb::Result<Connection> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.transient_connect_failures {
                return Err(duckdb::Error::InvalidPath(self.path.clone()));
            }
            Connection::open(&self.path)
        }

        fn is_transient(&self, err: &duckdb::Error) -> bool {
            matches!(err, duckdb::Error::InvalidPath(_))
        }
    }

    fn fast_options() -> SyncOptions {
        SyncOptions {
            table_timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn fixture() -> (TempDir, Vec<ManifestEntry>, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let records: Vec<_> = LOG.lines().filter_map(parse_line).collect();
        let shard_dir = tmp.path().join("shards");
        let manifest = write_shards(&classify(records), &shard_dir, "ops").unwrap();
        (tmp, manifest, shard_dir)
    }

    fn table_names(path: &Path) -> Vec<String> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn
            .prepare("SELECT table_name FROM information_schema.tables ORDER BY table_name")
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<duckdb::Result<Vec<_>>>()
            .unwrap();
        names
    }

    #[tokio::test]
    async fn test_sync_creates_one_table_per_entry() {
        let (tmp, manifest, shard_dir) = fixture();
        let db = tmp.path().join("ops.duckdb");
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute_batch("CREATE TABLE ops (legacy INTEGER)").unwrap();
        }

        let options = fast_options();
        let cancel = CancelFlag::new();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let report = sync_manifest(Arc::new(TestDriver::new(db.clone())), &job)
            .await
            .unwrap();

        assert_eq!(report.tables.len(), manifest.len());
        for (load, entry) in report.tables.iter().zip(&manifest) {
            assert_eq!(load.table_name, entry.table_name);
            assert_eq!(load.row_count, entry.row_count as u64);
        }
        assert_eq!(
            table_names(&db),
            vec!["ops_schema_01", "ops_schema_02", "ops_schema_03"]
        );
    }

    #[tokio::test]
    async fn test_resync_replaces_tables() {
        let (tmp, manifest, shard_dir) = fixture();
        let db = tmp.path().join("ops.duckdb");
        let options = fast_options();
        let cancel = CancelFlag::new();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let driver: Arc<dyn StoreDriver> = Arc::new(TestDriver::new(db.clone()));
        sync_manifest(Arc::clone(&driver), &job).await.unwrap();
        let report = sync_manifest(driver, &job).await.unwrap();
        assert_eq!(report.tables[0].row_count, 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_tables() {
        let (tmp, manifest, shard_dir) = fixture();
        std::fs::remove_file(shard_dir.join(&manifest[1].filename)).unwrap();
        let db = tmp.path().join("ops.duckdb");

        let options = fast_options();
        let cancel = CancelFlag::new();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let err = sync_manifest(Arc::new(TestDriver::new(db.clone())), &job)
            .await
            .unwrap_err();

        match err {
            PipelineError::Load { table, .. } => assert_eq!(table, "ops_schema_02"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table_names(&db), vec!["ops_schema_01"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_table() {
        let (tmp, manifest, shard_dir) = fixture();
        let db = tmp.path().join("ops.duckdb");
        let options = fast_options();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let err = sync_manifest(Arc::new(TestDriver::new(db.clone())), &job)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { completed: 0, .. }));
        assert!(table_names(&db).is_empty());
    }

    #[tokio::test]
    async fn test_transient_connect_is_retried() {
        let (tmp, manifest, shard_dir) = fixture();
        let db = tmp.path().join("ops.duckdb");
        let mut driver = TestDriver::new(db);
        driver.transient_connect_failures = 2;
        let driver = Arc::new(driver);

        let options = fast_options();
        let cancel = CancelFlag::new();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let report = sync_manifest(driver.clone(), &job).await.unwrap();
        assert_eq!(report.tables.len(), 3);
        assert_eq!(driver.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_prefix_rejected_before_connect() {
        let (tmp, manifest, shard_dir) = fixture();
        let driver = Arc::new(TestDriver::new(tmp.path().join("ops.duckdb")));
        let options = fast_options();
        let cancel = CancelFlag::new();
        let job = SyncJob {
            manifest: &manifest,
            shard_dir: &shard_dir,
            table_prefix: "ops; DROP TABLE x",
            options: &options,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let err = sync_manifest(driver.clone(), &job).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidIdentifier(_)));
        assert_eq!(driver.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let options = SyncOptions {
            backoff_base: Duration::from_millis(100),
            ..SyncOptions::default()
        };
        assert_eq!(options.backoff(1), Duration::from_millis(100));
        assert_eq!(options.backoff(2), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(400));
        assert_eq!(options.backoff(10), Duration::from_millis(3200));
    }

    #[test]
    fn test_backoff_saturates_on_huge_base() {
        let options = SyncOptions {
            backoff_base: Duration::MAX,
            ..SyncOptions::default()
        };
        assert_eq!(options.backoff(4), Duration::MAX);
    }

    #[tokio::test]
    async fn test_timeout_interrupts_running_load() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("slow.duckdb");
        let conn = SharedConn::new(Connection::open(&db).unwrap());

        let started = std::time::Instant::now();
        let err = run_blocking(&conn, "test", "late", Duration::from_millis(100), |c| {
            c.execute_batch(
                "CREATE TABLE late AS \
                 SELECT sum(a.range * b.range) AS s FROM range(1000000) a, range(1000000) b",
            )
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { .. }), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(60));

        let guard = conn.conn.lock().unwrap();
        let n: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'late'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 0);
    }
}
