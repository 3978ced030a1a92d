//! Document ingestion: walks the input folder, turns bank exports, payslips,
//! utility bills and mobility statements into canonical records, and keeps
//! the per-domain history tables free of duplicates.

pub mod classify;
pub mod config;
pub mod driver;
pub mod pdf;
pub mod remotes;

pub use classify::{classify, Domain, SourceKind};
pub use config::{load_settings, load_settings_or_default, Secrets, Settings};
pub use driver::{Driver, RunReport};
pub use pdf::{document_text, PdfExtract, PdfText};
pub use remotes::attach_remotes;
