use serde_json::Value;
use utils::parsing::parse_date;
use utils::{
    normalize_numeric_text, ColumnType, DocumentDomain, DomainSchema, KeyPolicy, RawRecord,
    RoundingPolicy, TransformContext,
};

pub const PARSER_NAME: &str = "utility_bills";

/// Electricity bills, unique by invoice number.
pub static SCHEMA: DomainSchema = DomainSchema {
    name: "bollette_luce_history",
    columns: &[
        ("fornitore", ColumnType::Text),
        ("numero_fattura", ColumnType::Text),
        ("data_fattura", ColumnType::Date),
        ("periodo_fornitura", ColumnType::Text),
        ("prezzo_unitario_kWh", ColumnType::Float),
        ("totale_da_pagare", ColumnType::Float),
        ("kWh_consumati_totali", ColumnType::Int),
        ("kWh_F1_consumati", ColumnType::Int),
        ("kWh_F2_consumati", ColumnType::Int),
        ("kWh_F3_consumati", ColumnType::Int),
        ("canone_tv", ColumnType::Float),
        ("spese_per_energia", ColumnType::Float),
        ("spese_trasporto_gestione_contatore", ColumnType::Float),
        ("spese_oneri", ColumnType::Float),
        ("altre_partite", ColumnType::Float),
        ("imposte_iva", ColumnType::Float),
        ("note", ColumnType::Text),
    ],
    mandatory: &[
        "fornitore",
        "numero_fattura",
        "data_fattura",
        "periodo_fornitura",
        "prezzo_unitario_kWh",
        "totale_da_pagare",
        "kWh_consumati_totali",
        "kWh_F1_consumati",
        "kWh_F2_consumati",
        "kWh_F3_consumati",
        "spese_per_energia",
        "spese_trasporto_gestione_contatore",
        "spese_oneri",
        "altre_partite",
        "imposte_iva",
    ],
    key: KeyPolicy::Natural {
        column: "numero_fattura",
    },
    rounding: RoundingPolicy::None,
    base_note: "Script completato con successo",
    extraction_fields: &[
        "fornitore (è una stringa ed è mandatory)",
        "numero_fattura (è una stringa ed è mandatory, è il riferimento della bolletta)",
        "data_fattura (è una data, si trova dopo il numero fattura, deve estrarla in questo formato yyyy-mm-dd)",
        "periodo_fornitura (è una stringa ed è mandatory, ad esempio Agosto 2024 - Settembre 2024)",
        "prezzo_unitario_kWh (è un double ed è mandatory)",
        "totale_da_pagare (è un double ed è mandatory, totale della bolletta da pagare)",
        "kWh_consumati_totali (è un int ed è mandatory)",
        "kWh_F1_consumati (è un intero ed è mandatory)",
        "kWh_F2_consumati (è un intero ed è mandatory)",
        "kWh_F3_consumati (è un intero ed è mandatory)",
        "canone_tv (è un double non è sempre presente)",
        "spese_per_energia (è un double, dettaglio specifico)",
        "spese_trasporto_gestione_contatore (è un double, dettaglio specifico)",
        "spese_oneri (è un double, dettaglio specifico)",
        "altre_partite (è un double, dettaglio specifico)",
        "imposte_iva (è un double, dettaglio specifico)",
    ],
};

#[derive(Debug, Default)]
pub struct UtilityBillsParser;

impl UtilityBillsParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentDomain for UtilityBillsParser {
    fn schema(&self) -> &DomainSchema {
        &SCHEMA
    }

    fn derive_fields(&self, raw: &mut RawRecord, _ctx: &TransformContext) {
        normalize_numeric_text(&SCHEMA, raw);

        // Invoice numbers sometimes come back as JSON numbers
        if let Some(Value::Number(n)) = raw.get("numero_fattura") {
            let text = n.to_string();
            raw.insert("numero_fattura".to_string(), Value::String(text));
        }

        // ISO or "Ottobre 2024"
        if let Some(Value::String(s)) = raw.get("data_fattura") {
            if let Ok(date) = parse_date(s) {
                let iso = date.format("%Y-%m-%d").to_string();
                raw.insert("data_fattura".to_string(), Value::String(iso));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use utils::{history_path, transform_batch, upsert_to_csv, CellValue};

    fn bill(numero: Value, totale: f64) -> RawRecord {
        json!({
            "fornitore": "Enel Energia",
            "numero_fattura": numero,
            "data_fattura": "Ottobre 2024",
            "periodo_fornitura": "Agosto 2024 - Settembre 2024",
            "prezzo_unitario_kWh": "0,1234",
            "totale_da_pagare": totale,
            "kWh_consumati_totali": 320,
            "kWh_F1_consumati": 100,
            "kWh_F2_consumati": 110,
            "kWh_F3_consumati": 110,
            "spese_per_energia": 40.0,
            "spese_trasporto_gestione_contatore": 15.0,
            "spese_oneri": 5.0,
            "altre_partite": 0.0,
            "imposte_iva": 8.0
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_schema_is_valid() {
        SCHEMA.validate().unwrap();
    }

    #[test]
    fn test_invoice_fields_without_rounding() {
        let out = transform_batch(
            &UtilityBillsParser::new(),
            vec![bill(json!("F-001"), 80.555)],
            &TransformContext::default(),
        );
        let r = &out[0];

        assert_eq!(r.get("prezzo_unitario_kWh"), Some(&CellValue::Float(0.1234)));
        assert_eq!(r.get("totale_da_pagare"), Some(&CellValue::Float(80.555)));
        assert_eq!(r.get("canone_tv"), Some(&CellValue::Float(0.0)));
        assert_eq!(
            r.get("data_fattura").unwrap().as_date(),
            NaiveDate::from_ymd_opt(2024, 10, 1)
        );
        assert_eq!(r.note(), "Script completato con successo");
    }

    #[test]
    fn test_numeric_invoice_number_is_text() {
        let out = transform_batch(
            &UtilityBillsParser::new(),
            vec![bill(json!(4711), 10.0)],
            &TransformContext::default(),
        );
        assert_eq!(out[0].key(&SCHEMA), "4711");
    }

    #[test]
    fn test_same_invoice_number_collapses_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = history_path(dir.path(), &SCHEMA);
        let parser = UtilityBillsParser::new();
        let ctx = TransformContext::default();

        let first = transform_batch(&parser, vec![bill(json!("F-9"), 50.0)], &ctx);
        let second = transform_batch(&parser, vec![bill(json!("F-9"), 75.0)], &ctx);

        upsert_to_csv(&path, &SCHEMA, &first).unwrap();
        let stats = upsert_to_csv(&path, &SCHEMA, &second).unwrap();

        assert_eq!(stats.added, 0);
        assert_eq!(stats.skipped, 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(";50.0;"));
        assert!(!content.contains(";75.0;"));
    }
}
