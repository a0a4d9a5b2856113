//! Schema classifier.
//!
//! Groups parsed records by their [`SchemaKey`]. Field order matters: two
//! records with the same names in a different order land in different
//! groups, so every shard's rows match its manifest `columns` exactly.

use indexmap::IndexMap;

use crate::models::{Record, SchemaKey};

/// Records partitioned by schema, each group in arrival order.
#[derive(Debug, Default, Clone)]
pub struct SchemaGroups {
    groups: IndexMap<SchemaKey, Vec<Record>>,
}

impl SchemaGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the group for its schema.
    pub fn push(&mut self, record: Record) {
        self.groups
            .entry(SchemaKey::of(&record))
            .or_default()
            .push(record);
    }

    /// Number of distinct schemas.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of records across all groups.
    pub fn record_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn get(&self, key: &SchemaKey) -> Option<&[Record]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Groups sorted by `(field count, field names)`, the manifest order.
    pub fn sorted(&self) -> Vec<(&SchemaKey, &[Record])> {
        let mut groups: Vec<(&SchemaKey, &[Record])> = self
            .groups
            .iter()
            .map(|(key, records)| (key, records.as_slice()))
            .collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        groups
    }
}

impl FromIterator<Record> for SchemaGroups {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut groups = SchemaGroups::new();
        for record in iter {
            groups.push(record);
        }
        groups
    }
}

/// Partition records by schema.
pub fn classify<I>(records: I) -> SchemaGroups
where
    I: IntoIterator<Item = Record>,
{
    records.into_iter().collect()
}
