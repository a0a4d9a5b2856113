//! Shard writer.
//!
//! Serializes each schema group to its own JSON-lines file and records the
//! set in a manifest. Groups are numbered after sorting by
//! `(field count, field names)`, so the same input always yields the same
//! table names and byte-identical files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::classify::SchemaGroups;
use crate::error::{PipelineError, Result};
use crate::ident::validate_identifier;
use crate::models::{ManifestEntry, Record};

/// `{prefix}_schema_{id:02}`.
pub fn table_name(prefix: &str, schema_id: usize) -> String {
    format!("{}_schema_{:02}", prefix, schema_id)
}

/// Location of the manifest for `prefix` inside `output_dir`.
pub fn manifest_path(output_dir: &Path, prefix: &str) -> PathBuf {
    output_dir.join(format!("{}_schema_manifest.json", prefix))
}

/// Write one shard per schema group plus the manifest.
///
/// Existing shard files and the manifest are overwritten, never merged.
pub fn write_shards(
    groups: &SchemaGroups,
    output_dir: &Path,
    prefix: &str,
) -> Result<Vec<ManifestEntry>> {
    validate_identifier(prefix)?;
    fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;

    let mut manifest = Vec::with_capacity(groups.len());
    for (idx, (key, records)) in groups.sorted().into_iter().enumerate() {
        let schema_id = idx + 1;
        let table_name = table_name(prefix, schema_id);
        let filename = format!("{}.jsonl", table_name);
        let path = output_dir.join(&filename);

        write_jsonl(&path, records)?;
        info!(rows = records.len(), path = %path.display(), "wrote shard");

        manifest.push(ManifestEntry {
            schema_id,
            table_name,
            columns: key.columns().to_vec(),
            filename,
            row_count: records.len(),
        });
    }

    let path = manifest_path(output_dir, prefix);
    write_manifest(&path, &manifest)?;
    info!(path = %path.display(), schemas = manifest.len(), "schema manifest saved");

    Ok(manifest)
}

fn write_jsonl(path: &Path, records: &[Record]) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut sink = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut sink, record).map_err(|e| PipelineError::json(path, e))?;
        sink.write_all(b"\n").map_err(|e| PipelineError::io(path, e))?;
    }
    sink.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

pub fn write_manifest(path: &Path, manifest: &[ManifestEntry]) -> Result<()> {
    let mut json = serde_json::to_string_pretty(manifest).map_err(|e| PipelineError::json(path, e))?;
    json.push('\n');
    fs::write(path, json).map_err(|e| PipelineError::io(path, e))
}
