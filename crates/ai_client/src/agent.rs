use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::payload::parse_extraction_payload;

/// Something that reads document text and answers with a JSON payload.
pub trait ExtractionAgent {
    /// Name used in log lines.
    fn describe(&self) -> String;

    /// Sends `document_text` together with the field descriptions and
    /// returns the raw reply.
    fn ask(&self, document_text: &str, fields: &[&str]) -> Result<String>;
}

/// Field name of a description such as `"uscite (valori double)"`.
pub fn field_name(description: &str) -> &str {
    let end = description
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(description.len());
    &description[..end]
}

/// Prompt asking for the listed fields as single-line JSON.
pub fn build_extraction_prompt(fields: &[&str], document_text: &str) -> String {
    format!(
        "Estrai le seguenti informazioni senza commenti, in formato json, su una sola riga e in un blocco di codice: {} dal seguente testo non formattato: {}",
        fields.join(" - "),
        document_text
    )
}

/// Asks the agent and validates the reply into raw records.
pub fn extract_records(
    agent: &dyn ExtractionAgent,
    document_text: &str,
    fields: &[&str],
) -> Result<Vec<Map<String, Value>>> {
    let reply = agent
        .ask(document_text, fields)
        .with_context(|| format!("Extraction agent {} failed", agent.describe()))?;

    let expected: Vec<&str> = fields.iter().map(|f| field_name(f)).collect();
    let records = parse_extraction_payload(&reply, &expected)
        .with_context(|| format!("Invalid reply from {}", agent.describe()))?;

    tracing::info!(
        "{} returned {} record(s)",
        agent.describe(),
        records.len()
    );
    Ok(records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::payload::PayloadError;

    /// Agent that always answers with the same text.
    pub struct CannedAgent(pub String);

    impl ExtractionAgent for CannedAgent {
        fn describe(&self) -> String {
            "canned agent".to_string()
        }

        fn ask(&self, _document_text: &str, _fields: &[&str]) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    const FIELDS: &[&str] = &[
        "numero_fattura (è una stringa ed è mandatory)",
        "totale_da_pagare (è un double ed è mandatory)",
    ];

    #[test]
    fn test_field_name() {
        assert_eq!(field_name("uscite (valori double)"), "uscite");
        assert_eq!(field_name("codice_iban"), "codice_iban");
        assert_eq!(field_name("targa(è una string)"), "targa");
    }

    #[test]
    fn test_prompt_lists_fields_and_text() {
        let prompt = build_extraction_prompt(&["a (x)", "b"], "TESTO");
        assert!(prompt.starts_with("Estrai le seguenti informazioni"));
        assert!(prompt.contains("a (x) - b dal seguente testo non formattato: TESTO"));
    }

    #[test]
    fn test_extract_records_from_fenced_reply() {
        let agent = CannedAgent(
            "```json\n{\"numero_fattura\": \"F1\", \"totale_da_pagare\": 80.5}\n```".to_string(),
        );
        let records = extract_records(&agent, "bolletta", FIELDS).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["numero_fattura"], "F1");
    }

    #[test]
    fn test_extract_records_rejects_unrelated_object() {
        let agent = CannedAgent("{\"foo\": 1}".to_string());
        let err = extract_records(&agent, "bolletta", FIELDS).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PayloadError>(),
            Some(PayloadError::NoExpectedFields)
        ));
    }
}
