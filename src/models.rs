//! Core data models used throughout logshard.
//!
//! These types represent the parsed records, schema keys, and manifest
//! entries that flow through the parse → classify → shard → sync pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fields every parsed record starts with, in this order.
pub const BASE_COLUMNS: [&str; 4] = ["timestamp", "message_type", "service", "action"];

/// A single normalized field value.
///
/// Serializes untagged, so a record becomes a flat JSON object of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

/// Insertion-ordered mapping from field name to value.
pub type Record = IndexMap<String, FieldValue>;

/// The ordered tuple of field names present in a record.
///
/// Two records share a schema iff their keys are identical, names and
/// order both. Ordering is `(field count, names)` so sorting a set of
/// keys yields the manifest order directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey(Vec<String>);

impl SchemaKey {
    pub fn of(record: &Record) -> Self {
        SchemaKey(record.keys().cloned().collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for SchemaKey {
    fn from(names: Vec<String>) -> Self {
        SchemaKey(names)
    }
}

impl Ord for SchemaKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SchemaKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One line of the schema manifest: a shard file and the table built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub schema_id: usize,
    pub table_name: String,
    pub columns: Vec<String>,
    /// Shard file name, relative to the shard directory.
    pub filename: String,
    pub row_count: usize,
}
