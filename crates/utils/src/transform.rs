//! Generic domain transformer: one pipeline driven by a `DomainSchema`
//! plus the small per-domain hooks of `DocumentDomain`.

use chrono::NaiveDate;
use serde_json::Value;

use crate::cast::{cast_record, cast_value};
use crate::parsing::parse_amount;
use crate::record_key::derive_record_key;
use crate::schema::{
    CanonicalRecord, CellValue, ColumnType, DomainSchema, KeyPolicy, RawRecord, RoundingPolicy,
    NOTE_COLUMN, RECORD_KEY_COLUMN,
};

/// Per-file information available to field derivation.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    pub source_file: String,
    /// Statement date parsed from the file name, if any.
    pub statement_date: Option<NaiveDate>,
}

impl TransformContext {
    pub fn new(source_file: impl Into<String>, statement_date: Option<NaiveDate>) -> Self {
        Self {
            source_file: source_file.into(),
            statement_date,
        }
    }
}

/// The capability set each document domain provides.
pub trait DocumentDomain {
    fn schema(&self) -> &DomainSchema;

    /// Computes domain-specific fields in place (renames, constants, splits).
    fn derive_fields(&self, raw: &mut RawRecord, ctx: &TransformContext);

    /// Bookkeeping rows return false and are dropped.
    fn keep(&self, _raw: &RawRecord) -> bool {
        true
    }
}

/// Runs the full pipeline on a batch: derive, filter, audit, cast, key, round.
pub fn transform_batch(
    domain: &dyn DocumentDomain,
    batch: Vec<RawRecord>,
    ctx: &TransformContext,
) -> Vec<CanonicalRecord> {
    let schema = domain.schema();
    tracing::info!(
        "{}: transforming {} raw record(s) from {}",
        schema.name,
        batch.len(),
        ctx.source_file
    );

    let mut derived = Vec::with_capacity(batch.len());
    let mut filtered = 0usize;
    for mut raw in batch {
        domain.derive_fields(&mut raw, ctx);
        if domain.keep(&raw) {
            derived.push(raw);
        } else {
            filtered += 1;
        }
    }
    if filtered > 0 {
        tracing::info!("{}: filtered {} bookkeeping row(s)", schema.name, filtered);
    }

    audit_mandatory_fields(schema, &mut derived);

    let records: Vec<CanonicalRecord> = derived
        .iter()
        .map(|raw| {
            let mut record = cast_record(raw, schema);
            assign_key(schema, &mut record);
            apply_rounding(schema, &mut record);
            record
        })
        .collect();

    tracing::info!(
        "{}: transformation produced {} record(s)",
        schema.name,
        records.len()
    );
    records
}

/// Writes the `note` field of every record: the base note followed by one
/// "Verificare <field> mancante" fragment per missing mandatory field.
pub fn audit_mandatory_fields(schema: &DomainSchema, batch: &mut [RawRecord]) {
    let mut mandatory: Vec<&str> = Vec::with_capacity(schema.mandatory.len());
    for field in schema.mandatory {
        if !mandatory.contains(field) {
            mandatory.push(field);
        }
    }

    let mut missing_counts = vec![0usize; mandatory.len()];
    for raw in batch.iter_mut() {
        let mut note = schema.base_note.to_string();
        for (idx, field) in mandatory.iter().enumerate() {
            if is_field_missing(schema, raw, field) {
                missing_counts[idx] += 1;
                note.push_str(&missing_fragment(field));
            }
        }
        raw.insert(NOTE_COLUMN.to_string(), Value::String(note));
    }

    for (field, count) in mandatory.iter().zip(missing_counts) {
        if count > 0 {
            tracing::warn!(
                "{}: {} missing value(s) in mandatory field '{}'",
                schema.name,
                count,
                field
            );
        }
    }
}

/// Rewrites Italian-notation numeric text ("1.234,56") in the schema's float
/// and int columns as JSON numbers. Text that does not parse is left alone.
pub fn normalize_numeric_text(schema: &DomainSchema, raw: &mut RawRecord) {
    for &(column, ty) in schema.columns {
        if !matches!(ty, ColumnType::Float | ColumnType::Int) {
            continue;
        }
        let parsed = match raw.get(column) {
            Some(Value::String(s)) => parse_amount(s).ok().and_then(serde_json::Number::from_f64),
            _ => None,
        };
        if let Some(number) = parsed {
            raw.insert(column.to_string(), Value::Number(number));
        }
    }
}

pub fn missing_fragment(field: &str) -> String {
    format!("; Verificare {} mancante", field)
}

fn is_field_missing(schema: &DomainSchema, raw: &RawRecord, field: &str) -> bool {
    let ty = schema.column_type(field).unwrap_or(ColumnType::Text);
    cast_value(raw.get(field), ty).is_defaulted()
}

fn assign_key(schema: &DomainSchema, record: &mut CanonicalRecord) {
    match &schema.key {
        KeyPolicy::Hashed { fields } => {
            let key = derive_record_key(record, fields);
            if let Some(cell) = record.cell_mut(RECORD_KEY_COLUMN) {
                cell.value = CellValue::Text(key);
                cell.defaulted = false;
            }
        }
        KeyPolicy::Natural { column } => {
            if record.cell(column).map_or(true, |c| c.defaulted) {
                tracing::warn!(
                    "{}: natural key '{}' is missing, record will share the empty key",
                    schema.name,
                    column
                );
            }
        }
    }
}

fn apply_rounding(schema: &DomainSchema, record: &mut CanonicalRecord) {
    if schema.rounding != RoundingPolicy::CeilFloatsTwoDecimals {
        return;
    }
    for &(column, ty) in schema.columns {
        if ty != ColumnType::Float {
            continue;
        }
        if let Some(cell) = record.cell_mut(column) {
            if let CellValue::Float(v) = cell.value {
                cell.value = CellValue::Float(ceil_two_decimals(v));
            }
        }
    }
}

/// Rounds up to two decimals. The result is never below `value`.
pub fn ceil_two_decimals(value: f64) -> f64 {
    let scaled = value * 100.0;
    if !scaled.is_finite() {
        return value;
    }
    let cents = scaled.ceil();
    // value * 100 can overshoot an exact cent (0.1 * 100 = 10.000000000000002)
    let lower = (cents - 1.0) / 100.0;
    if lower >= value {
        return lower;
    }
    let rounded = cents / 100.0;
    if rounded >= value {
        return rounded;
    }
    // or land on a whole cent just below it (0.1 + 0.25 = 0.35000000000000003)
    let upper = (cents + 1.0) / 100.0;
    if upper >= value {
        upper
    } else {
        value
    }
}
