use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("reply is empty")]
    Empty,

    #[error("reply contains no JSON object")]
    NoJson,

    #[error("reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object or a list of objects, found {0}")]
    NotAnObject(&'static str),

    #[error("field '{0}' is not a scalar value")]
    NonScalarValue(String),

    #[error("reply has none of the requested fields")]
    NoExpectedFields,
}

/// Parses an extraction reply into raw records.
///
/// Markdown code fences and chatter around the JSON are tolerated. The JSON
/// must be an object, or a list of objects for multi-row documents; every
/// value must be a scalar and every object must carry at least one of
/// `expected_fields`.
pub fn parse_extraction_payload(
    reply: &str,
    expected_fields: &[&str],
) -> Result<Vec<Map<String, Value>>, PayloadError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }

    let json = locate_json(trimmed).ok_or(PayloadError::NoJson)?;
    let value: Value = serde_json::from_str(json)?;

    let objects = match value {
        Value::Object(obj) => vec![obj],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(PayloadError::NotAnObject(kind(&other))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(PayloadError::NotAnObject(kind(&other))),
    };

    if objects.is_empty() {
        return Err(PayloadError::NoExpectedFields);
    }

    for obj in &objects {
        if let Some((field, _)) = obj
            .iter()
            .find(|(_, v)| matches!(v, Value::Object(_) | Value::Array(_)))
        {
            return Err(PayloadError::NonScalarValue(field.clone()));
        }
        if !expected_fields.is_empty() && !expected_fields.iter().any(|f| obj.contains_key(*f)) {
            return Err(PayloadError::NoExpectedFields);
        }
    }

    Ok(objects)
}

/// Slice from the first `{`/`[` to the last matching closer.
fn locate_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: &[&str] = &["targa", "totale_pagato"];

    #[test]
    fn test_plain_object() {
        let records =
            parse_extraction_payload(r#"{"targa": "AB123CD", "totale_pagato": 49.9}"#, EXPECTED)
                .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["totale_pagato"], 49.9);
    }

    #[test]
    fn test_code_fence_and_chatter() {
        let reply = "Ecco i dati:\n```json\n{\"targa\": \"AB123CD\", \"km_percorsi\": null}\n```\nFine.";
        let records = parse_extraction_payload(reply, EXPECTED).unwrap();
        assert_eq!(records[0]["targa"], "AB123CD");
        assert!(records[0]["km_percorsi"].is_null());
    }

    #[test]
    fn test_list_of_rows() {
        let reply = r#"[{"targa": "A"}, {"targa": "B"}]"#;
        let records = parse_extraction_payload(reply, EXPECTED).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            parse_extraction_payload("   ", EXPECTED),
            Err(PayloadError::Empty)
        ));
        assert!(matches!(
            parse_extraction_payload("non ho trovato nulla", EXPECTED),
            Err(PayloadError::NoJson)
        ));
        assert!(matches!(
            parse_extraction_payload("{\"targa\": ", EXPECTED),
            Err(PayloadError::NoJson) | Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_extraction_payload("[1, 2]", EXPECTED),
            Err(PayloadError::NotAnObject("a number"))
        ));
        assert!(matches!(
            parse_extraction_payload(r#"{"targa": {"x": 1}}"#, EXPECTED),
            Err(PayloadError::NonScalarValue(f)) if f == "targa"
        ));
        assert!(matches!(
            parse_extraction_payload(r#"{"other": 1}"#, EXPECTED),
            Err(PayloadError::NoExpectedFields)
        ));
        assert!(matches!(
            parse_extraction_payload("[]", EXPECTED),
            Err(PayloadError::NoExpectedFields)
        ));
    }
}
