pub mod cast;
pub mod checkpoint;
pub mod csv_input;
pub mod error;
pub mod parsing;
pub mod record_key;
pub mod remote;
pub mod schema;
pub mod store;
pub mod transform;

// Re-export commonly used items
pub use crate::cast::{cast_record, cast_value, CastOutcome, DefaultReason};
pub use crate::checkpoint::Checkpoint;
pub use crate::csv_input::read_csv_records;
pub use crate::error::StoreError;
pub use crate::parsing::{extract_date_from_filename, parse_amount, parse_date, parse_magnitude};
pub use crate::record_key::{derive_record_key, make_hash};
pub use crate::remote::{upsert_remote, RemoteTable};
pub use crate::schema::{
    CanonicalRecord, CellValue, ColumnType, DomainSchema, KeyPolicy, RawRecord, RoundingPolicy,
    NOTE_COLUMN, RECORD_KEY_COLUMN,
};
pub use crate::store::{history_path, upsert_to_csv, MergeStats};
pub use crate::transform::{
    normalize_numeric_text, transform_batch, DocumentDomain, TransformContext,
};
