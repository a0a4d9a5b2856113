//! Error types for the ingestion pipeline.
//!
//! Malformed log lines are not errors: the parser drops them and the run
//! only counts them. Everything here is a file-system or database failure
//! that the caller has to see.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("log file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("invalid SQL identifier '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    #[error("{} database not initialized: {} does not exist", .destination, .path.display())]
    LocalStoreMissing {
        destination: &'static str,
        path: PathBuf,
    },

    #[error("[{destination}] failed to connect: {source}")]
    Connect {
        destination: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("[{destination}] failed to load table {table}: {source}")]
    Load {
        destination: &'static str,
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("[{destination}] loading table {table} timed out after {limit:?}")]
    Timeout {
        destination: &'static str,
        table: String,
        limit: Duration,
    },

    #[error("[{destination}] sync cancelled after {completed} table(s)")]
    Cancelled {
        destination: &'static str,
        completed: usize,
    },

    #[error("[{destination}] background load task failed: {message}")]
    Task {
        destination: &'static str,
        message: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_keeps_subsecond_limit() {
        let err = PipelineError::Timeout {
            destination: "DuckDB",
            table: "ops_schema_01".to_string(),
            limit: Duration::from_millis(100),
        };
        assert_eq!(
            err.to_string(),
            "[DuckDB] loading table ops_schema_01 timed out after 100ms"
        );
    }
}
