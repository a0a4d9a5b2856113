//! SQL identifier allowlist.
//!
//! Table names reach DDL statements, and they are derived from a
//! user-supplied prefix or the log file stem, so every one is checked here
//! before use and emitted double-quoted.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{PipelineError, Result};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Accept `name` only if it is a plain identifier.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENT_RE.is_match(name) {
        Ok(name)
    } else {
        Err(PipelineError::InvalidIdentifier(name.to_string()))
    }
}

/// A table name that has passed [`validate_identifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdent(String);

impl TableIdent {
    pub fn new(name: &str) -> Result<Self> {
        validate_identifier(name).map(|n| TableIdent(n.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name double-quoted for a statement.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a string as a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Turn a file stem into a usable table prefix.
///
/// Characters outside `[A-Za-z0-9_]` become `_`; a leading digit gets a `_`
/// in front. An empty stem becomes `log`.
pub fn sanitize_prefix(stem: &str) -> String {
    let mut out: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        out.push_str("log");
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
