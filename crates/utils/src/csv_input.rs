//! Reading `;`-delimited statement exports into raw records.

use std::io::Read;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::schema::RawRecord;

pub const INPUT_DELIMITER: u8 = b';';

const BOM: &str = "\u{feff}";

/// Reads a header-first `;` CSV. Header names are trimmed (a leading BOM is
/// dropped), blank cells become `null`, short rows are padded with `null`.
pub fn read_csv_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(INPUT_DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim_start_matches(BOM).trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read CSV row {}", idx + 1))?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut record = RawRecord::new();
        for (col_idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = match row.get(col_idx).map(str::trim) {
                Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            record.insert(header.clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}
