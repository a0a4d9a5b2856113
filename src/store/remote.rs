//! MotherDuck driver.
//!
//! Remote sync is best-effort: a missing token or database name skips the
//! stage with a warning instead of failing the run.

use std::fmt;
use std::sync::Arc;

use duckdb::{Config, Connection};
use tracing::{info, warn};

use super::{sync_manifest, StoreDriver, SyncJob, SyncOutcome};
use crate::error::Result;
use crate::ident::validate_identifier;

pub const DESTINATION: &str = "MotherDuck";

/// Error text fragments that mark a failure as a connectivity problem.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection",
    "network",
    "timed out",
    "timeout",
    "http",
    "unavailable",
];

/// Driver for a hosted MotherDuck database (`md:<name>`).
#[derive(Clone)]
pub struct RemoteDriver {
    database: String,
    token: String,
}

impl fmt::Debug for RemoteDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDriver")
            .field("database", &self.database)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl RemoteDriver {
    /// Build a driver, or explain why remote sync has to be skipped.
    ///
    /// Empty strings count as absent.
    pub fn resolve(
        token: Option<String>,
        database: Option<String>,
    ) -> std::result::Result<Self, String> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "MOTHERDUCK_TOKEN not set".to_string())?;
        let database = database
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| "database name not provided".to_string())?;
        Ok(Self { database, token })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl StoreDriver for RemoteDriver {
    fn destination(&self) -> &'static str {
        DESTINATION
    }

    fn connect(&self) -> duckdb::Result<Connection> {
        let config = Config::default()
            .enable_autoload_extension(true)?
            .with("motherduck_token", &self.token)?;
        Connection::open_with_flags(format!("md:{}", self.database), config)
    }

    fn is_transient(&self, err: &duckdb::Error) -> bool {
        is_transient_message(&err.to_string())
    }
}

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Run the remote sync stage.
pub async fn sync_remote(
    token: Option<String>,
    database: Option<String>,
    skip: bool,
    job: &SyncJob<'_>,
) -> Result<SyncOutcome> {
    if skip {
        info!("skipping MotherDuck load (flag set)");
        return Ok(SyncOutcome::Skipped {
            destination: DESTINATION,
            reason: "flag set".to_string(),
        });
    }

    let driver = match RemoteDriver::resolve(token, database) {
        Ok(driver) => driver,
        Err(reason) => {
            warn!("skipping MotherDuck load ({})", reason);
            return Ok(SyncOutcome::Skipped {
                destination: DESTINATION,
                reason,
            });
        }
    };
    validate_identifier(driver.database())?;

    info!(database = driver.database(), "connecting to MotherDuck");
    let report = sync_manifest(Arc::new(driver), job).await?;
    info!("MotherDuck load complete");
    Ok(SyncOutcome::Loaded(report))
}
