use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ident::{sanitize_prefix, validate_identifier};
use crate::store::SyncOptions;

/// Primary and fallback environment variables for the remote database name.
pub const REMOTE_DB_ENV: [&str; 2] = ["OPERATIONS_MOTHERDUCK_DB", "DATABASE_NAME"];

/// Upper bound for `sync.backoff_base_ms` (one minute).
const MAX_BACKOFF_BASE_MS: u64 = 60_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_table_timeout_secs")]
    pub table_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table_timeout_secs: 300,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

fn default_table_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}

impl SyncConfig {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            table_timeout: Duration::from_secs(self.table_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            database: None,
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "MOTHERDUCK_TOKEN".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.sync.table_timeout_secs == 0 {
        anyhow::bail!("sync.table_timeout_secs must be > 0");
    }
    if config.sync.max_retries > 10 {
        anyhow::bail!("sync.max_retries must be <= 10");
    }
    if config.sync.backoff_base_ms > MAX_BACKOFF_BASE_MS {
        anyhow::bail!("sync.backoff_base_ms must be <= {}", MAX_BACKOFF_BASE_MS);
    }
    if config.remote.token_env.trim().is_empty() {
        anyhow::bail!("remote.token_env must not be empty");
    }

    Ok(config)
}

/// Load `path` if given, otherwise fall back to defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

/// `<log-dir>/<log-stem>_structured`.
pub fn default_output_dir(log_file: &Path) -> PathBuf {
    let stem = log_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parent = log_file.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}_structured", stem))
}

/// Explicit prefixes must already be identifiers; the file-stem default is
/// sanitized into one.
pub fn resolve_table_prefix(explicit: Option<&str>, log_file: &Path) -> Result<String> {
    match explicit {
        Some(prefix) => {
            validate_identifier(prefix)?;
            Ok(prefix.to_string())
        }
        None => {
            let stem = log_file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(sanitize_prefix(&stem))
        }
    }
}

/// Remote database name: CLI flag, then config file, then environment.
pub fn resolve_remote_database<F>(cli: Option<&str>, config: &RemoteConfig, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    cli.map(str::to_string)
        .or_else(|| config.database.clone())
        .or_else(|| REMOTE_DB_ENV.iter().find_map(|name| env(name)))
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_output_dir() {
        assert_eq!(
            default_output_dir(Path::new("/var/log/operations.log")),
            PathBuf::from("/var/log/operations_structured")
        );
        assert_eq!(
            default_output_dir(Path::new("ops.log")),
            PathBuf::from("ops_structured")
        );
    }

    #[test]
    fn test_table_prefix_resolution() {
        let log = Path::new("/data/operations-log.2024.txt");
        assert_eq!(
            resolve_table_prefix(None, log).unwrap(),
            "operations_log_2024"
        );
        assert_eq!(resolve_table_prefix(Some("ops"), log).unwrap(), "ops");
        assert!(resolve_table_prefix(Some("ops-log"), log).is_err());
    }

    #[test]
    fn test_remote_database_precedence() {
        let env: HashMap<&str, &str> =
            HashMap::from([("DATABASE_NAME", "fallback"), ("OPERATIONS_MOTHERDUCK_DB", "primary")]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let cfg = RemoteConfig::default();
        assert_eq!(
            resolve_remote_database(Some("cli"), &cfg, lookup),
            Some("cli".to_string())
        );
        assert_eq!(
            resolve_remote_database(None, &cfg, lookup),
            Some("primary".to_string())
        );

        let only_fallback = |k: &str| (k == "DATABASE_NAME").then(|| "fallback".to_string());
        assert_eq!(
            resolve_remote_database(None, &cfg, only_fallback),
            Some("fallback".to_string())
        );

        let from_file = RemoteConfig {
            database: Some("file".to_string()),
            ..RemoteConfig::default()
        };
        assert_eq!(
            resolve_remote_database(None, &from_file, lookup),
            Some("file".to_string())
        );
        assert_eq!(resolve_remote_database(None, &cfg, |_| None), None);
    }

    #[test]
    fn test_load_config_defaults_and_validation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logshard.toml");

        std::fs::write(&path, "[sync]\nmax_retries = 5\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.sync.max_retries, 5);
        assert_eq!(cfg.sync.table_timeout_secs, 300);
        assert_eq!(cfg.remote.token_env, "MOTHERDUCK_TOKEN");

        std::fs::write(&path, "[sync]\ntable_timeout_secs = 0\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "[sync]\nbackoff_base_ms = 9223372036854775807\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("backoff_base_ms"));

        assert!(load_or_default(None).is_ok());
    }
}
