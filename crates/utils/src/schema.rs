use std::fmt;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Loosely-typed extracted fields, as produced by CSV parsing or by the
/// extraction agent. Any field may be absent or malformed.
pub type RawRecord = Map<String, Value>;

/// Column holding the content-derived key for hashed domains.
pub const RECORD_KEY_COLUMN: &str = "record_key";

/// Column accumulating "Verificare <field> mancante" fragments.
pub const NOTE_COLUMN: &str = "note";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
    Float,
    Int,
}

impl ColumnType {
    /// The value substituted when a column is absent or fails to cast.
    pub fn default_value(self) -> CellValue {
        match self {
            ColumnType::Text => CellValue::Text(String::new()),
            ColumnType::Date => CellValue::Date(None),
            ColumnType::Float => CellValue::Float(0.0),
            ColumnType::Int => CellValue::Int(0),
        }
    }

    /// SQL type used when creating remote tables.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Date => "DATE",
            ColumnType::Float => "FLOAT",
            ColumnType::Int => "BIGINT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Date(Option<NaiveDate>),
    Float(f64),
    Int(i64),
}

impl CellValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Date(_) => ColumnType::Date,
            CellValue::Float(_) => ColumnType::Float,
            CellValue::Int(_) => ColumnType::Int,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => *d,
            _ => None,
        }
    }

    /// JSON form used by the remote sinks (dates as ISO strings, null dates as null).
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Date(Some(d)) => Value::String(d.format("%Y-%m-%d").to_string()),
            CellValue::Date(None) => Value::Null,
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Int(i) => Value::from(*i),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Date(Some(d)) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Date(None) => Ok(()),
            // Debug keeps the trailing ".0" on whole numbers ("50.0", not "50")
            CellValue::Float(v) => write!(f, "{:?}", v),
            CellValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// How the dedup unit of a domain is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPolicy {
    /// SHA-256 of the pipe-joined fields, stored in `record_key`.
    Hashed { fields: &'static [&'static str] },
    /// A business key column used as-is.
    Natural { column: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingPolicy {
    None,
    /// Every float column rounded up to two decimals.
    CeilFloatsTwoDecimals,
}

/// Static declaration of one document domain's output table.
#[derive(Debug, Clone)]
pub struct DomainSchema {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ColumnType)],
    pub mandatory: &'static [&'static str],
    pub key: KeyPolicy,
    pub rounding: RoundingPolicy,
    pub base_note: &'static str,
    /// Field descriptions handed to the extraction agent for PDF sources.
    pub extraction_fields: &'static [&'static str],
}

impl DomainSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(name, _)| *name).collect()
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, ty)| *ty)
    }

    /// Column the sinks use for dedup.
    pub fn key_column(&self) -> &'static str {
        match &self.key {
            KeyPolicy::Hashed { .. } => RECORD_KEY_COLUMN,
            KeyPolicy::Natural { column } => column,
        }
    }

    /// Checks the declaration rules: unique typed columns, a `note`
    /// column, key fields that exist, and `record_key` for hashed domains.
    pub fn validate(&self) -> Result<()> {
        let names = self.column_names();
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(anyhow!("{}: duplicate column '{}'", self.name, name));
            }
        }
        if !names.contains(&NOTE_COLUMN) {
            return Err(anyhow!("{}: missing '{}' column", self.name, NOTE_COLUMN));
        }
        match &self.key {
            KeyPolicy::Hashed { fields } => {
                if !names.contains(&RECORD_KEY_COLUMN) {
                    return Err(anyhow!(
                        "{}: hashed key requires a '{}' column",
                        self.name,
                        RECORD_KEY_COLUMN
                    ));
                }
                if fields.is_empty() {
                    return Err(anyhow!("{}: hashed key has no fields", self.name));
                }
                for field in fields.iter() {
                    if !names.contains(field) {
                        return Err(anyhow!(
                            "{}: key field '{}' is not a column",
                            self.name,
                            field
                        ));
                    }
                }
            }
            KeyPolicy::Natural { column } => {
                if self.column_type(column) != Some(ColumnType::Text) {
                    return Err(anyhow!(
                        "{}: natural key '{}' must be a text column",
                        self.name,
                        column
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One typed cell of a canonical record.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub column: &'static str,
    pub value: CellValue,
    /// True when the value is the type default (absent or failed cast).
    pub defaulted: bool,
}

/// Fully-typed, fully-populated output row of a domain transformer.
/// Cells follow the schema's column order exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    cells: Vec<Cell>,
}

impl CanonicalRecord {
    pub(crate) fn from_cells(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|c| c.column)
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cell(column).map(|c| &c.value)
    }

    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column == column)
    }

    pub(crate) fn cell_mut(&mut self, column: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.column == column)
    }

    pub fn note(&self) -> &str {
        self.get(NOTE_COLUMN).and_then(|v| v.as_text()).unwrap_or("")
    }

    /// String form of the dedup key for this record.
    pub fn key(&self, schema: &DomainSchema) -> String {
        self.get(schema.key_column())
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    /// CSV row in column order.
    pub fn to_row(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.value.to_string()).collect()
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::with_capacity(self.cells.len());
        for cell in &self.cells {
            obj.insert(cell.column.to_string(), cell.value.to_json());
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[(&str, ColumnType)] = &[
        ("record_key", ColumnType::Text),
        ("data", ColumnType::Date),
        ("importo", ColumnType::Float),
        ("note", ColumnType::Text),
    ];

    fn schema(key: KeyPolicy) -> DomainSchema {
        DomainSchema {
            name: "test",
            columns: COLUMNS,
            mandatory: &["data"],
            key,
            rounding: RoundingPolicy::None,
            base_note: "ok",
            extraction_fields: &[],
        }
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(CellValue::Float(50.0).to_string(), "50.0");
        assert_eq!(CellValue::Float(0.1).to_string(), "0.1");
        assert_eq!(CellValue::Int(1850).to_string(), "1850");
        let d = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        assert_eq!(CellValue::Date(Some(d)).to_string(), "2025-01-03");
        assert_eq!(CellValue::Date(None).to_string(), "");
    }

    #[test]
    fn test_validate_hashed_schema() {
        assert!(schema(KeyPolicy::Hashed { fields: &["data", "importo"] })
            .validate()
            .is_ok());
        assert!(schema(KeyPolicy::Hashed { fields: &["missing"] })
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_natural_key_must_be_text() {
        assert!(schema(KeyPolicy::Natural { column: "record_key" })
            .validate()
            .is_ok());
        assert!(schema(KeyPolicy::Natural { column: "importo" })
            .validate()
            .is_err());
    }

    #[test]
    fn test_key_column() {
        assert_eq!(
            schema(KeyPolicy::Hashed { fields: &["data"] }).key_column(),
            "record_key"
        );
        assert_eq!(
            schema(KeyPolicy::Natural { column: "record_key" }).key_column(),
            "record_key"
        );
    }
}
