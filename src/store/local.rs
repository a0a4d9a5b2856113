//! Local DuckDB driver.
//!
//! The database file is created by a separate preparation step; this driver
//! only rebuilds tables inside it and refuses to run against a missing file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use duckdb::Connection;
use tracing::info;

use super::{sync_manifest, StoreDriver, SyncJob, SyncOutcome};
use crate::error::{PipelineError, Result};

pub const DESTINATION: &str = "DuckDB";

/// Driver for a file-backed DuckDB database.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    path: PathBuf,
}

impl LocalDriver {
    /// Fails with [`PipelineError::LocalStoreMissing`] if `path` does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::LocalStoreMissing {
                destination: DESTINATION,
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreDriver for LocalDriver {
    fn destination(&self) -> &'static str {
        DESTINATION
    }

    fn connect(&self) -> duckdb::Result<Connection> {
        Connection::open(&self.path)
    }
}

/// Run the local sync stage.
///
/// Skipped when `skip` is set or no database path was given.
pub async fn sync_local(path: Option<&Path>, skip: bool, job: &SyncJob<'_>) -> Result<SyncOutcome> {
    if skip {
        info!("skipping DuckDB load (flag set)");
        return Ok(SyncOutcome::Skipped {
            destination: DESTINATION,
            reason: "flag set".to_string(),
        });
    }
    let Some(path) = path else {
        info!("skipping DuckDB load (no database path provided)");
        return Ok(SyncOutcome::Skipped {
            destination: DESTINATION,
            reason: "no database path provided".to_string(),
        });
    };

    let driver = LocalDriver::open(path)?;
    info!(path = %driver.path().display(), "loading shards into DuckDB");
    let report = sync_manifest(Arc::new(driver), job).await?;
    Ok(SyncOutcome::Loaded(report))
}
