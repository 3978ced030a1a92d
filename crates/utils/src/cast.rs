//! Schema casting: every declared column present, typed, or defaulted.

use serde_json::Value;

use crate::parsing::parse_date;
use crate::schema::{Cell, CanonicalRecord, CellValue, ColumnType, DomainSchema, RawRecord};

/// Why a cell ended up holding its type default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultReason {
    Missing,
    Invalid(String),
}

/// Result of casting one raw value to a column type.
#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    Cast(CellValue),
    Defaulted {
        value: CellValue,
        reason: DefaultReason,
    },
}

impl CastOutcome {
    pub fn value(&self) -> &CellValue {
        match self {
            CastOutcome::Cast(v) => v,
            CastOutcome::Defaulted { value, .. } => value,
        }
    }

    pub fn into_value(self) -> CellValue {
        match self {
            CastOutcome::Cast(v) => v,
            CastOutcome::Defaulted { value, .. } => value,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, CastOutcome::Defaulted { .. })
    }
}

/// True for values that count as "not there": absent, null, or blank text.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Casts a single raw value. Pure: never panics, never logs.
pub fn cast_value(value: Option<&Value>, ty: ColumnType) -> CastOutcome {
    let value = match value {
        Some(v) if !is_missing(Some(v)) => v,
        _ => {
            return CastOutcome::Defaulted {
                value: ty.default_value(),
                reason: DefaultReason::Missing,
            }
        }
    };

    let result = match ty {
        ColumnType::Text => cast_text(value),
        ColumnType::Float => cast_float(value),
        ColumnType::Int => cast_int(value),
        ColumnType::Date => cast_date(value),
    };

    match result {
        Ok(v) => CastOutcome::Cast(v),
        Err(reason) => CastOutcome::Defaulted {
            value: ty.default_value(),
            reason: DefaultReason::Invalid(reason),
        },
    }
}

fn cast_text(value: &Value) -> Result<CellValue, String> {
    match value {
        Value::String(s) => Ok(CellValue::Text(s.clone())),
        Value::Number(n) => Ok(CellValue::Text(n.to_string())),
        Value::Bool(b) => Ok(CellValue::Text(b.to_string())),
        other => Err(format!("expected a scalar, found {}", other)),
    }
}

fn cast_float(value: &Value) -> Result<CellValue, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(CellValue::Float(f)),
        _ => Err(format!("'{}' is not a float", value)),
    }
}

fn cast_int(value: &Value) -> Result<CellValue, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    };
    parsed
        .map(CellValue::Int)
        .ok_or_else(|| format!("'{}' is not an integer", value))
}

fn truncate(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn cast_date(value: &Value) -> Result<CellValue, String> {
    match value {
        Value::String(s) => parse_date(s)
            .map(|d| CellValue::Date(Some(d)))
            .map_err(|e| e.to_string()),
        other => Err(format!("'{}' is not a date", other)),
    }
}

/// Projects a raw record onto the schema's columns and casts each one.
/// Undeclared fields are dropped; failures degrade to defaults with a warning.
pub fn cast_record(raw: &RawRecord, schema: &DomainSchema) -> CanonicalRecord {
    let cells = schema
        .columns
        .iter()
        .map(|&(column, ty)| {
            let outcome = cast_value(raw.get(column), ty);
            if let CastOutcome::Defaulted {
                reason: DefaultReason::Invalid(reason),
                value,
            } = &outcome
            {
                tracing::warn!(
                    "{}: column '{}' could not be cast to {:?} ({}), using default '{}'",
                    schema.name,
                    column,
                    ty,
                    reason,
                    value
                );
            }
            Cell {
                column,
                defaulted: outcome.is_defaulted(),
                value: outcome.into_value(),
            }
        })
        .collect();
    CanonicalRecord::from_cells(cells)
}
