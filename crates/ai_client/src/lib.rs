//! Extraction agent used for PDF sources.
//!
//! The agent gets the document text plus a list of field descriptions and
//! answers with a JSON payload. [`payload`] turns that reply into raw records
//! and rejects anything that is not a flat JSON object (or list of objects).

pub mod agent;
pub mod ollama;
pub mod payload;

pub use agent::{build_extraction_prompt, extract_records, field_name, ExtractionAgent};
pub use ollama::{OllamaClient, OllamaClientConfig};
pub use payload::{parse_extraction_payload, PayloadError};
