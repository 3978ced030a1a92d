//! File-backed historical datasets: one `;`-delimited CSV per domain,
//! append-only and unique by the domain's key column.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::schema::{CanonicalRecord, DomainSchema};

/// Field delimiter used for every history file, both when reading and writing.
pub const HISTORY_DELIMITER: u8 = b';';

/// Statistics about an upsert into a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

impl MergeStats {
    pub fn has_duplicates(&self) -> bool {
        self.skipped > 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Location of a domain's history CSV: `<output_dir>/<table>/<table>.csv`.
pub fn history_path<P: AsRef<Path>>(output_dir: P, schema: &DomainSchema) -> PathBuf {
    output_dir
        .as_ref()
        .join(schema.name)
        .join(format!("{}.csv", schema.name))
}

/// Reads the key column of an existing history file.
pub fn read_existing_keys<P: AsRef<Path>>(
    path: P,
    schema: &DomainSchema,
) -> Result<HashSet<String>, StoreError> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(HISTORY_DELIMITER)
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let expected: Vec<String> = schema.column_names().iter().map(|c| c.to_string()).collect();
    if headers != expected {
        return Err(StoreError::HeaderMismatch {
            path: path.to_path_buf(),
            expected,
            found: headers,
        });
    }

    let key_column = schema.key_column();
    let key_idx = headers
        .iter()
        .position(|h| h == key_column)
        .ok_or_else(|| StoreError::MissingKeyColumn {
            path: path.to_path_buf(),
            column: key_column.to_string(),
        })?;

    let mut keys = HashSet::new();
    for row in rdr.records() {
        let row = row?;
        if let Some(key) = row.get(key_idx) {
            keys.insert(key.to_string());
        }
    }
    Ok(keys)
}

/// Keeps the records whose key is neither in `existing` nor earlier in `batch`.
pub fn select_new_records<'a>(
    schema: &DomainSchema,
    batch: &'a [CanonicalRecord],
    existing: &HashSet<String>,
) -> (Vec<&'a CanonicalRecord>, MergeStats) {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut stats = MergeStats {
        total: batch.len(),
        ..MergeStats::default()
    };

    let mut fresh = Vec::new();
    for record in batch {
        let key = record.key(schema);
        if existing.contains(&key) || !seen.insert(key) {
            stats.skipped += 1;
        } else {
            fresh.push(record);
            stats.added += 1;
        }
    }
    (fresh, stats)
}

/// Inserts-if-absent `batch` into the history CSV at `path`.
///
/// A missing file is created with a header and the batch. An existing file
/// only gets the rows whose key it does not already hold; when there are
/// none the file is not touched. Existing rows are never rewritten.
pub fn upsert_to_csv<P: AsRef<Path>>(
    path: P,
    schema: &DomainSchema,
    batch: &[CanonicalRecord],
) -> Result<MergeStats, StoreError> {
    let path = path.as_ref();

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (fresh, stats) = select_new_records(schema, batch, &HashSet::new());
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(HISTORY_DELIMITER)
            .from_path(path)?;
        wtr.write_record(schema.column_names())?;
        for record in fresh {
            wtr.write_record(record.to_row())?;
        }
        wtr.flush()?;
        tracing::info!("Created {} with {} record(s)", path.display(), stats.added);
        return Ok(stats);
    }

    let existing = read_existing_keys(path, schema)?;
    let (fresh, stats) = select_new_records(schema, batch, &existing);

    if fresh.is_empty() {
        tracing::info!("No new records for {}", path.display());
        return Ok(stats);
    }

    let file = OpenOptions::new().append(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(HISTORY_DELIMITER)
        .has_headers(false)
        .from_writer(file);
    for record in fresh {
        wtr.write_record(record.to_row())?;
    }
    wtr.flush()?;

    tracing::info!(
        "Appended {} new record(s) to {} ({} duplicate(s) skipped)",
        stats.added,
        path.display(),
        stats.skipped
    );
    Ok(stats)
}
