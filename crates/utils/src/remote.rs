use std::collections::HashSet;

use anyhow::Result;

use crate::schema::{CanonicalRecord, DomainSchema};
use crate::store::{select_new_records, MergeStats};

/// A remote table that can list its keys and take single-record inserts.
pub trait RemoteTable {
    /// Human-readable name used in log lines.
    fn describe(&self) -> String;

    /// All values currently stored in `key_column` (every page).
    fn fetch_existing_keys(&mut self, key_column: &str) -> Result<HashSet<String>>;

    fn insert_record(&mut self, schema: &DomainSchema, record: &CanonicalRecord) -> Result<()>;
}

/// Inserts-if-absent `batch` into a remote table.
///
/// Fetching the existing keys is fatal for the call; a failing insert is
/// logged, counted in `failed`, and the rest of the batch still goes through.
pub fn upsert_remote(
    table: &mut dyn RemoteTable,
    schema: &DomainSchema,
    batch: &[CanonicalRecord],
) -> Result<MergeStats> {
    let key_column = schema.key_column();
    let existing = table.fetch_existing_keys(key_column)?;
    tracing::info!(
        "{}: {} existing key(s) in {}",
        schema.name,
        existing.len(),
        table.describe()
    );

    let (fresh, mut stats) = select_new_records(schema, batch, &existing);

    for record in fresh {
        let key = record.key(schema);
        match table.insert_record(schema, record) {
            Ok(()) => {
                tracing::info!("Record with key '{}' added to {}", key, table.describe());
            }
            Err(e) => {
                tracing::error!(
                    "Failed to add record with key '{}' to {}: {:#}",
                    key,
                    table.describe(),
                    e
                );
                stats.added -= 1;
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
