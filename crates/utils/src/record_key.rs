use sha2::{Digest, Sha256};

use crate::schema::CanonicalRecord;

/// String form of a key field that was absent or failed to cast.
pub const MISSING_SENTINEL: &str = "None";

/// Pipe-joined canonical form of the key fields, in declared order.
pub fn canonical_key_string(record: &CanonicalRecord, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| match record.cell(field) {
            Some(cell) if !cell.defaulted => cell.value.to_string(),
            _ => MISSING_SENTINEL.to_string(),
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Hex SHA-256 digest of the record's canonical key string.
pub fn derive_record_key(record: &CanonicalRecord, fields: &[&str]) -> String {
    make_hash(&canonical_key_string(record, fields))
}

pub fn make_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let hash = hasher.finalize();
    hex::encode(hash)
}
