//! Remote tables the history batches are mirrored to.
//!
//! Both implement [`utils::RemoteTable`], so the insert-if-absent algorithm
//! lives in one place (`utils::upsert_remote`) and these modules only deal
//! with transport.

pub mod airtable;
pub mod postgres;

pub use airtable::AirtableTable;
pub use postgres::PostgresTable;
